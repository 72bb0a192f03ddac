//! Casting votes: gatekeeping, encryption and the atomic commit.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cipher::{BallotCipher, CipherError};
use crate::model::{
    common::{BallotPreference, VoteMethod, VoterKey},
    db::{EncryptedBallot, VoterRecord},
};
use crate::store::{CastCommit, Storage, StoreError};
use crate::token::{Token, TokenError, TokenHasher};

#[derive(Debug, Error)]
pub enum CastError {
    #[error("voter has already voted")]
    AlreadyVoted,
    #[error("voter is not eligible to vote")]
    NotEligible,
    #[error("token is missing or invalid")]
    TokenInvalid,
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a voter learns about their cast. Never names the ballot records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastOutcome {
    pub ballots_recorded: usize,
    pub cast_at: DateTime<Utc>,
}

/// Coordinates a vote from precondition checks through to the atomic commit.
pub struct VoteCaster<'a, S: ?Sized> {
    store: &'a S,
    cipher: &'a BallotCipher,
    hasher: &'a TokenHasher,
}

impl<'a, S: Storage + ?Sized> VoteCaster<'a, S> {
    pub fn new(store: &'a S, cipher: &'a BallotCipher, hasher: &'a TokenHasher) -> Self {
        Self {
            store,
            cipher,
            hasher,
        }
    }

    /// Check that `voter` is registered, eligible and has not voted yet.
    pub async fn check_standing(&self, voter: &VoterKey) -> Result<VoterRecord, CastError> {
        let record = self
            .store
            .voter(voter)
            .await?
            .ok_or(CastError::NotEligible)?;
        if !record.is_eligible {
            return Err(CastError::NotEligible);
        }
        if record.has_voted {
            return Err(CastError::AlreadyVoted);
        }
        Ok(record)
    }

    /// Check that `voter` may cast a ballot right now.
    ///
    /// Offline voters must also present the token they were issued. These
    /// checks give early, friendly errors; [`Self::cast`] re-checks atomically.
    pub async fn check_preconditions(
        &self,
        voter: &VoterKey,
        token: Option<&Token>,
    ) -> Result<VoterRecord, CastError> {
        let record = self.check_standing(voter).await?;
        if record.vote_method == Some(VoteMethod::Offline) {
            let token = token.ok_or(CastError::TokenInvalid)?;
            let stored = record.token_hash.as_ref().ok_or(CastError::TokenInvalid)?;
            if !self.hasher.verify(token, stored)? {
                return Err(CastError::TokenInvalid);
            }
        }
        Ok(record)
    }

    /// Encrypt one ballot per preference and commit them together with the
    /// voter's has-voted flag.
    pub async fn cast(
        &self,
        voter: &VoterKey,
        preferences: &[BallotPreference],
    ) -> Result<CastOutcome, CastError> {
        let cast_at = Utc::now();
        let ballots = preferences
            .iter()
            .map(|preference| {
                self.cipher
                    .encrypt(preference)
                    .map(|sealed| EncryptedBallot::new(sealed, cast_at))
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Sealed {} ballot(s)", ballots.len());

        match self.store.commit_cast(voter, &ballots).await? {
            CastCommit::Committed => {
                info!("Recorded a vote of {} ballot(s)", ballots.len());
                Ok(CastOutcome {
                    ballots_recorded: ballots.len(),
                    cast_at,
                })
            }
            CastCommit::AlreadyVoted => {
                warn!("Rejected a second vote");
                Err(CastError::AlreadyVoted)
            }
            CastCommit::NotEligible => Err(CastError::NotEligible),
        }
    }

    /// Check preconditions, then cast.
    pub async fn submit(
        &self,
        voter: &VoterKey,
        token: Option<&Token>,
        preferences: &[BallotPreference],
    ) -> Result<CastOutcome, CastError> {
        self.check_preconditions(voter, token).await?;
        self.cast(voter, preferences).await
    }

    /// Find the voter a presented token belongs to, for sign-in at a
    /// polling station.
    pub async fn authenticate_token(&self, token: &Token) -> Result<VoterRecord, CastError> {
        let digest = self.hasher.hash(token)?;
        let record = self
            .store
            .voter_by_token(&digest)
            .await?
            .ok_or(CastError::TokenInvalid)?;
        if !record.is_eligible {
            return Err(CastError::NotEligible);
        }
        if record.has_voted {
            return Err(CastError::AlreadyVoted);
        }
        Ok(record)
    }
}
