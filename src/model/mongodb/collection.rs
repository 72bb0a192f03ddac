use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{EncryptedBallot, VoterRecord};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Ballots carry no voter-identifying fields, and no index links them to voters.
impl MongoCollection for EncryptedBallot {
    const NAME: &'static str = "ballots";
}

impl MongoCollection for VoterRecord {
    const NAME: &'static str = "voters";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    // Token digests are unique among voters that hold one.
    let token_index = IndexModel::builder()
        .keys(doc! {"token_hash": 1})
        .options(IndexOptions::builder().unique(true).sparse(true).build())
        .build();
    Coll::<VoterRecord>::from_db(db)
        .create_index(token_index, None)
        .await?;

    Ok(())
}
