//! Persistence for ballots and the voter registry.
//!
//! The two halves are kept separate: [`BallotStore`] has no way
//! to look up or link to a voter, and [`VoterRegistry`] never sees ballots.
//! The only place they meet is [`CastLedger::commit_cast`], which records
//! ballots and marks a voter as having voted in a single atomic step.

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

use mongodb::error::Error as DbError;
use rocket::{
    request::{self, FromRequest, Request},
    State,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    common::VoterKey,
    db::{BallotId, EncryptedBallot, VoterRecord},
};
use crate::token::TokenDigest;

mod memory;
pub use memory::MemoryStore;

mod mongo;
pub use mongo::{MongoStore, MAX_TRANSACTION_ATTEMPTS};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("a record with the same unique key already exists")]
    DuplicateKey,
    #[error("transaction abandoned after {attempts} attempts")]
    TransactionExhausted { attempts: u32 },
}

/// Append-only storage of encrypted ballots.
#[rocket::async_trait]
pub trait BallotStore: Send + Sync {
    async fn append(&self, ballot: EncryptedBallot) -> Result<BallotId, StoreError>;

    /// Every ballot ever cast. Order carries no meaning.
    async fn list_all(&self) -> Result<Vec<EncryptedBallot>, StoreError>;
}

/// Voting participation, as recorded in the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turnout {
    pub registered: u64,
    pub voted: u64,
    pub voted_online: u64,
    pub voted_offline: u64,
}

/// Read access to the voter registry, plus token bookkeeping.
#[rocket::async_trait]
pub trait VoterRegistry: Send + Sync {
    async fn voter(&self, key: &VoterKey) -> Result<Option<VoterRecord>, StoreError>;

    async fn voter_by_token(&self, digest: &TokenDigest)
        -> Result<Option<VoterRecord>, StoreError>;

    /// Every token digest currently held by a voter.
    async fn token_digests(&self) -> Result<HashSet<TokenDigest>, StoreError>;

    /// Give a voter who may still vote a new token digest and mark them as
    /// voting offline.
    ///
    /// Returns `Ok(false)` if there is no such voter, or they can no longer
    /// vote, and `Err(StoreError::DuplicateKey)` if the digest is held by
    /// another voter.
    async fn assign_token(&self, key: &VoterKey, digest: &TokenDigest)
        -> Result<bool, StoreError>;

    async fn turnout(&self) -> Result<Turnout, StoreError>;
}

/// The result of trying to record a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastCommit {
    Committed,
    /// Nothing was written; the voter had already voted.
    AlreadyVoted,
    /// Nothing was written; the voter is missing or ineligible.
    NotEligible,
}

#[rocket::async_trait]
pub trait CastLedger: Send + Sync {
    /// Atomically append `ballots` and mark `voter` as having voted,
    /// clearing any token they held.
    ///
    /// Either everything is written or nothing is. Of any number of
    /// concurrent calls for the same voter, at most one commits.
    async fn commit_cast(
        &self,
        voter: &VoterKey,
        ballots: &[EncryptedBallot],
    ) -> Result<CastCommit, StoreError>;
}

/// A complete storage backend.
pub trait Storage: BallotStore + VoterRegistry + CastLedger {}

impl<T: BallotStore + VoterRegistry + CastLedger> Storage for T {}

/// The storage backend in managed state.
#[derive(Clone)]
pub struct Store(Arc<dyn Storage>);

impl Store {
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self(Arc::new(storage))
    }
}

impl Deref for Store {
    type Target = dyn Storage;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Store {
    type Error = ();

    /// Get the storage backend from the managed state.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        req.guard::<&State<Store>>()
            .await
            .map(|store| store.inner().clone())
    }
}
