use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rocket::tokio::sync::Mutex;

use super::{
    BallotStore, CastCommit, CastLedger, StoreError, Turnout, VoterRegistry,
};
use crate::model::{
    common::{VoteMethod, VoterKey},
    db::{BallotId, EncryptedBallot, VoterRecord},
};
use crate::token::TokenDigest;

/// An in-process storage backend.
///
/// Holding one lock across both halves makes every cast atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    ballots: Vec<EncryptedBallot>,
    voters: BTreeMap<VoterKey, VoterRecord>,
}

impl MemoryStore {
    /// Add or replace a voter in the registry.
    pub async fn insert_voter(&self, voter: VoterRecord) {
        self.inner
            .lock()
            .await
            .voters
            .insert(voter.key.clone(), voter);
    }
}

#[rocket::async_trait]
impl BallotStore for MemoryStore {
    async fn append(&self, ballot: EncryptedBallot) -> Result<BallotId, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.ballots.iter().any(|b| b.id == ballot.id) {
            return Err(StoreError::DuplicateKey);
        }
        let id = ballot.id.clone();
        inner.ballots.push(ballot);
        Ok(id)
    }

    async fn list_all(&self) -> Result<Vec<EncryptedBallot>, StoreError> {
        Ok(self.inner.lock().await.ballots.clone())
    }
}

#[rocket::async_trait]
impl VoterRegistry for MemoryStore {
    async fn voter(&self, key: &VoterKey) -> Result<Option<VoterRecord>, StoreError> {
        Ok(self.inner.lock().await.voters.get(key).cloned())
    }

    async fn voter_by_token(
        &self,
        digest: &TokenDigest,
    ) -> Result<Option<VoterRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .voters
            .values()
            .find(|voter| voter.token_hash.as_ref() == Some(digest))
            .cloned())
    }

    async fn token_digests(&self) -> Result<HashSet<TokenDigest>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .voters
            .values()
            .filter_map(|voter| voter.token_hash.clone())
            .collect())
    }

    async fn assign_token(
        &self,
        key: &VoterKey,
        digest: &TokenDigest,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let taken = inner
            .voters
            .values()
            .any(|voter| &voter.key != key && voter.token_hash.as_ref() == Some(digest));
        if taken {
            return Err(StoreError::DuplicateKey);
        }
        match inner.voters.get_mut(key) {
            Some(voter) if voter.may_vote() => {
                voter.token_hash = Some(digest.clone());
                voter.vote_method = Some(VoteMethod::Offline);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn turnout(&self) -> Result<Turnout, StoreError> {
        let inner = self.inner.lock().await;
        let mut turnout = Turnout {
            registered: inner.voters.len() as u64,
            ..Turnout::default()
        };
        for voter in inner.voters.values().filter(|voter| voter.has_voted) {
            turnout.voted += 1;
            match voter.vote_method {
                Some(VoteMethod::Offline) => turnout.voted_offline += 1,
                _ => turnout.voted_online += 1,
            }
        }
        Ok(turnout)
    }
}

#[rocket::async_trait]
impl CastLedger for MemoryStore {
    async fn commit_cast(
        &self,
        voter: &VoterKey,
        ballots: &[EncryptedBallot],
    ) -> Result<CastCommit, StoreError> {
        let mut inner = self.inner.lock().await;
        let record = match inner.voters.get_mut(voter) {
            Some(record) if record.is_eligible => record,
            _ => return Ok(CastCommit::NotEligible),
        };
        if record.has_voted {
            return Ok(CastCommit::AlreadyVoted);
        }
        record.has_voted = true;
        record.token_hash = None;
        inner.ballots.extend_from_slice(ballots);
        Ok(CastCommit::Committed)
    }
}
