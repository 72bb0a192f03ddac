use log::{error, warn};
use rocket::{http::Status, response::Responder};
use thiserror::Error;

use crate::cast::CastError;
use crate::logging::RequestId;
use crate::store::StoreError;
use crate::token::TokenError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cast(#[from] CastError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Status(Status::NotFound, message.into())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Cast(CastError::AlreadyVoted) => Status::Conflict,
            Self::Cast(CastError::NotEligible) => Status::Forbidden,
            Self::Cast(CastError::TokenInvalid) => Status::Unauthorized,
            Self::Cast(_) | Self::Store(_) | Self::Token(_) => Status::InternalServerError,
            Self::Status(status, _) => *status,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let id = RequestId::of(req);
        let status = self.status();
        if status.code >= 500 {
            error!("req{id} failed: {self}");
        } else {
            warn!("req{id} rejected: {self}");
        }
        Err(status)
    }
}
