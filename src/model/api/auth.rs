use std::fmt::Display;
use std::marker::PhantomData;

use rocket::{
    http::Status,
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    Request, State,
};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::Config;

pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Different privilege levels.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Rights {
    /// The polling front end: casts votes and signs voters in by token.
    Submitter,
    /// Election officials: read results and the ballot dump.
    Reader,
    /// The registrar: issues offline tokens.
    Registrar,
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Submitter => "submitter",
                Self::Reader => "reader",
                Self::Registrar => "registrar",
            }
        )
    }
}

/// A type-level privilege level.
pub trait Role: Send + Sync {
    const RIGHTS: Rights;
}

pub struct Submitter;
pub struct Reader;
pub struct Registrar;

impl Role for Submitter {
    const RIGHTS: Rights = Rights::Submitter;
}

impl Role for Reader {
    const RIGHTS: Rights = Rights::Reader;
}

impl Role for Registrar {
    const RIGHTS: Rights = Rights::Registrar;
}

#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error("missing {API_KEY_HEADER} header")]
    Missing,
    #[error("API key does not grant {0} rights")]
    Invalid(Rights),
}

/// Proof that the caller presented the API key for role `R`.
pub struct ApiKey<R> {
    phantom: PhantomData<R>,
}

impl<R: Role> ApiKey<R> {
    /// Does `presented` match the configured key for this role?
    pub fn permits(presented: &str, config: &Config) -> bool {
        presented
            .as_bytes()
            .ct_eq(config.api_key(R::RIGHTS).as_bytes())
            .into()
    }
}

#[rocket::async_trait]
impl<'r, R: Role> FromRequest<'r> for ApiKey<R> {
    type Error = ApiKeyError;

    /// Check the `X-Api-Key` header against the key configured for this role.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = req.guard::<&State<Config>>().await.unwrap(); // Valid as `Config` is always managed

        let presented = try_outcome!(req
            .headers()
            .get_one(API_KEY_HEADER)
            .into_outcome((Status::Unauthorized, ApiKeyError::Missing)));

        if Self::permits(presented, config) {
            Outcome::Success(Self {
                phantom: PhantomData,
            })
        } else {
            Outcome::Failure((Status::Forbidden, ApiKeyError::Invalid(R::RIGHTS)))
        }
    }
}
