use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::model::common::HexBytes;

/// Opaque ballot identifier: 128 random bits in lowercase hex.
///
/// Must not encode cast order, so this is never an `ObjectId`.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BallotId(String);

impl BallotId {
    pub fn random() -> Self {
        let mut bytes = [0_u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(data_encoding::HEXLOWER.encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BallotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The output of sealing one ballot preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBallot {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub auth_tag: Vec<u8>,
}

/// An encrypted ballot, as stored in the ballot box.
///
/// These fields are the whole record: there is nothing here, and nothing
/// to join on, that leads back to the voter. Records are written once and
/// never updated or deleted. The binary fields stay hex until the ballot
/// is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBallot {
    #[serde(rename = "_id")]
    pub id: BallotId,
    pub ciphertext: HexBytes,
    pub iv: HexBytes,
    pub auth_tag: HexBytes,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl EncryptedBallot {
    /// Wrap freshly sealed ballot data in a new record with a random ID.
    pub fn new(sealed: SealedBallot, cast_at: DateTime<Utc>) -> Self {
        Self {
            id: BallotId::random(),
            ciphertext: HexBytes::encode(&sealed.ciphertext),
            iv: HexBytes::encode(&sealed.iv),
            auth_tag: HexBytes::encode(&sealed.auth_tag),
            cast_at,
        }
    }
}
