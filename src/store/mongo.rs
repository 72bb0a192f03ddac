use std::collections::HashSet;

use log::{debug, warn};
use mongodb::{
    bson::doc,
    error::{Error as DbError, TRANSIENT_TRANSACTION_ERROR},
    Client, Database,
};
use rocket::futures::TryStreamExt;

use super::{
    BallotStore, CastCommit, CastLedger, StoreError, Turnout, VoterRegistry,
};
use crate::model::{
    common::{VoteMethod, VoterKey},
    db::{BallotId, EncryptedBallot, VoterRecord},
    mongodb::{is_duplicate_key_error, Coll},
};
use crate::retry::{self, Attempt, RetryError};
use crate::token::TokenDigest;

/// How many times to run a cast transaction that keeps hitting transient errors.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// MongoDB storage. Casting requires a replica set, for transactions.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn ballots(&self) -> Coll<EncryptedBallot> {
        Coll::from_db(&self.db)
    }

    fn voters(&self) -> Coll<VoterRecord> {
        Coll::from_db(&self.db)
    }

    /// One attempt at the cast transaction.
    async fn try_commit_cast(
        &self,
        voter: &VoterKey,
        ballots: &[EncryptedBallot],
    ) -> Result<CastCommit, DbError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        // Only an eligible voter who has not yet voted matches, so at most
        // one concurrent transaction can flip the flag.
        let filter = doc! {
            "_id": voter.clone(),
            "has_voted": false,
            "is_eligible": true,
        };
        let update = doc! {
            "$set": { "has_voted": true },
            "$unset": { "token_hash": "" },
        };
        let result = self
            .voters()
            .update_one_with_session(filter, update, None, &mut session)
            .await?;
        if result.modified_count != 1 {
            session.abort_transaction().await?;
            let current = self
                .voters()
                .find_one(doc! {"_id": voter.clone()}, None)
                .await?;
            return Ok(match current {
                Some(record) if record.is_eligible && record.has_voted => {
                    CastCommit::AlreadyVoted
                }
                _ => CastCommit::NotEligible,
            });
        }

        if !ballots.is_empty() {
            self.ballots()
                .insert_many_with_session(ballots, None, &mut session)
                .await?;
        }
        session.commit_transaction().await?;
        Ok(CastCommit::Committed)
    }

    async fn count_voters(&self, filter: mongodb::bson::Document) -> Result<u64, StoreError> {
        Ok(self.voters().count_documents(filter, None).await?)
    }
}

#[rocket::async_trait]
impl BallotStore for MongoStore {
    async fn append(&self, ballot: EncryptedBallot) -> Result<BallotId, StoreError> {
        let id = ballot.id.clone();
        match self.ballots().insert_one(ballot, None).await {
            Ok(_) => Ok(id),
            Err(err) if is_duplicate_key_error(&err) => Err(StoreError::DuplicateKey),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<EncryptedBallot>, StoreError> {
        let ballots = self
            .ballots()
            .find(None, None)
            .await?
            .try_collect()
            .await?;
        Ok(ballots)
    }
}

#[rocket::async_trait]
impl VoterRegistry for MongoStore {
    async fn voter(&self, key: &VoterKey) -> Result<Option<VoterRecord>, StoreError> {
        Ok(self
            .voters()
            .find_one(doc! {"_id": key.clone()}, None)
            .await?)
    }

    async fn voter_by_token(
        &self,
        digest: &TokenDigest,
    ) -> Result<Option<VoterRecord>, StoreError> {
        Ok(self
            .voters()
            .find_one(doc! {"token_hash": digest.clone()}, None)
            .await?)
    }

    async fn token_digests(&self) -> Result<HashSet<TokenDigest>, StoreError> {
        let holders: Vec<VoterRecord> = self
            .voters()
            .find(doc! {"token_hash": {"$exists": true}}, None)
            .await?
            .try_collect()
            .await?;
        Ok(holders
            .into_iter()
            .filter_map(|voter| voter.token_hash)
            .collect())
    }

    async fn assign_token(
        &self,
        key: &VoterKey,
        digest: &TokenDigest,
    ) -> Result<bool, StoreError> {
        let filter = doc! {
            "_id": key.clone(),
            "has_voted": false,
            "is_eligible": true,
        };
        let update = doc! {
            "$set": {
                "token_hash": digest.clone(),
                "vote_method": VoteMethod::Offline,
            }
        };
        match self.voters().update_one(filter, update, None).await {
            Ok(result) => Ok(result.matched_count == 1),
            Err(err) if is_duplicate_key_error(&err) => Err(StoreError::DuplicateKey),
            Err(err) => Err(err.into()),
        }
    }

    async fn turnout(&self) -> Result<Turnout, StoreError> {
        Ok(Turnout {
            registered: self.count_voters(doc! {}).await?,
            voted: self.count_voters(doc! {"has_voted": true}).await?,
            voted_online: self
                .count_voters(doc! {"has_voted": true, "vote_method": {"$ne": "offline"}})
                .await?,
            voted_offline: self
                .count_voters(doc! {"has_voted": true, "vote_method": "offline"})
                .await?,
        })
    }
}

#[rocket::async_trait]
impl CastLedger for MongoStore {
    async fn commit_cast(
        &self,
        voter: &VoterKey,
        ballots: &[EncryptedBallot],
    ) -> Result<CastCommit, StoreError> {
        retry::bounded_async(MAX_TRANSACTION_ATTEMPTS, |attempt| async move {
            match self.try_commit_cast(voter, ballots).await {
                Ok(commit) => Attempt::Done(commit),
                Err(err) if err.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
                    warn!("Cast transaction hit a transient error (attempt {attempt}): {err}");
                    Attempt::Retry
                }
                Err(err) => Attempt::Fail(StoreError::from(err)),
            }
        })
        .await
        .map_err(|err| match err {
            RetryError::Exhausted { attempts } => {
                debug!("Giving up on cast transaction");
                StoreError::TransactionExhausted { attempts }
            }
            RetryError::Failed(err) => err,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::cipher::BallotCipher;
    use crate::model::common::BallotPreference;

    fn ballot() -> EncryptedBallot {
        let sealed = BallotCipher::example()
            .encrypt(&BallotPreference::example())
            .unwrap();
        EncryptedBallot::new(sealed, Utc::now())
    }

    #[ignore = "needs a MongoDB replica set"]
    #[backend_test]
    async fn cast_is_recorded_once(store: MongoStore, voters: Coll<VoterRecord>) {
        let voter = VoterRecord::example();
        voters.insert_one(&voter, None).await.unwrap();

        let first = store.commit_cast(&voter.key, &[ballot(), ballot()]).await;
        let second = store.commit_cast(&voter.key, &[ballot()]).await;
        assert_eq!(first.unwrap(), CastCommit::Committed);
        assert_eq!(second.unwrap(), CastCommit::AlreadyVoted);
        assert_eq!(store.list_all().await.unwrap().len(), 2);

        let stored = store.voter(&voter.key).await.unwrap().unwrap();
        assert!(stored.has_voted);
        assert!(stored.token_hash.is_none());
    }

    #[ignore = "needs a MongoDB replica set"]
    #[backend_test]
    async fn malformed_ballots_are_listed(store: MongoStore, ballots: Coll<EncryptedBallot>) {
        store.append(ballot()).await.unwrap();
        let mut malformed = mongodb::bson::to_document(&ballot()).unwrap();
        malformed.insert("ciphertext", "not-hex");
        ballots
            .clone_with_type::<mongodb::bson::Document>()
            .insert_one(malformed, None)
            .await
            .unwrap();

        let listed = store.list_all().await.unwrap();
        assert_eq!(listed.len(), 2);
        let cipher = BallotCipher::example();
        let unreadable = listed.iter().filter(|b| cipher.open(b).is_err()).count();
        assert_eq!(unreadable, 1);
    }

    #[ignore = "needs a MongoDB replica set"]
    #[backend_test]
    async fn ineligible_cast_writes_nothing(store: MongoStore, voters: Coll<VoterRecord>) {
        let voter = VoterRecord::example_ineligible();
        voters.insert_one(&voter, None).await.unwrap();

        let commit = store.commit_cast(&voter.key, &[ballot()]).await.unwrap();
        assert_eq!(commit, CastCommit::NotEligible);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[ignore = "needs a MongoDB replica set"]
    #[backend_test]
    async fn token_digests_are_unique(store: MongoStore, voters: Coll<VoterRecord>) {
        let first = VoterRecord::example();
        let second = VoterRecord::example_offline();
        voters.insert_many([&first, &second], None).await.unwrap();

        let digest = crate::token::TokenHasher::example()
            .hash(&"abcdef".into())
            .unwrap();
        assert!(store.assign_token(&first.key, &digest).await.unwrap());
        assert!(matches!(
            store.assign_token(&second.key, &digest).await,
            Err(StoreError::DuplicateKey)
        ));
        assert_eq!(store.token_digests().await.unwrap(), HashSet::from([digest]));
    }
}
