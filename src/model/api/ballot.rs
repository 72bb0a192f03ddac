use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kdf::Argon2Params;
use crate::model::{
    common::{Contests, HexBytes},
    db::{BallotId, EncryptedBallot},
};

/// An encrypted ballot, as exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotRecord {
    pub id: BallotId,
    pub ciphertext: HexBytes,
    pub iv: HexBytes,
    pub auth_tag: HexBytes,
    pub cast_at: DateTime<Utc>,
}

impl From<EncryptedBallot> for BallotRecord {
    fn from(ballot: EncryptedBallot) -> Self {
        Self {
            id: ballot.id,
            ciphertext: ballot.ciphertext,
            iv: ballot.iv,
            auth_tag: ballot.auth_tag,
            cast_at: ballot.cast_at,
        }
    }
}

impl From<BallotRecord> for EncryptedBallot {
    fn from(record: BallotRecord) -> Self {
        Self {
            id: record.id,
            ciphertext: record.ciphertext,
            iv: record.iv,
            auth_tag: record.auth_tag,
            cast_at: record.cast_at,
        }
    }
}

/// The whole ballot box, with what is needed to re-tally it offline
/// given the ballot secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotDump {
    pub contests: Contests,
    pub kdf: Argon2Params,
    pub ballots: Vec<BallotRecord>,
}
