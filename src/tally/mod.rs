//! Tallying the ballot box.
//!
//! Every stored ballot is decrypted and grouped by position, then each
//! position is counted independently. A ballot that fails to decrypt is
//! counted as unreadable and skipped; it never stops the tally.

use std::collections::BTreeMap;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::cipher::BallotCipher;
use crate::model::{
    common::{CandidateId, Contests, Position},
    db::EncryptedBallot,
};
use crate::store::{BallotStore, StoreError};

mod irv;
pub use irv::{run_irv, TallyError, TallyResult, TallyRound};

/// How many stored ballots could be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    pub total_ballots: u64,
    pub decrypted: u64,
    pub unreadable: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyReport {
    pub participation: Participation,
    /// One entry per configured position.
    pub positions: BTreeMap<Position, Result<TallyResult, TallyError>>,
}

/// Decrypt `ballots` and run IRV for every position in `contests`.
pub fn tally_ballots(
    ballots: &[EncryptedBallot],
    cipher: &BallotCipher,
    contests: &Contests,
) -> TallyReport {
    let mut participation = Participation {
        total_ballots: ballots.len() as u64,
        ..Participation::default()
    };
    let mut rankings: BTreeMap<&Position, Vec<Vec<CandidateId>>> =
        contests.keys().map(|position| (position, Vec::new())).collect();

    for ballot in ballots {
        let preference = match cipher.open(ballot) {
            Ok(preference) => preference,
            Err(err) => {
                warn!("Skipping unreadable ballot {}: {err}", ballot.id);
                participation.unreadable += 1;
                continue;
            }
        };
        participation.decrypted += 1;
        match rankings.get_mut(&preference.position) {
            Some(position) => position.push(preference.ranking),
            None => warn!("Skipping ballot {} for an unknown position", ballot.id),
        }
    }

    let positions = contests
        .iter()
        .map(|(position, candidates)| {
            let ballots = rankings.remove(position).unwrap_or_default();
            let result = run_irv(&ballots, candidates);
            match &result {
                Ok(result) => info!("Tallied {position}: {} wins", result.winner),
                Err(err) => error!("Failed to tally {position}: {err}"),
            }
            (position.clone(), result)
        })
        .collect();

    TallyReport {
        participation,
        positions,
    }
}

/// Tally everything in the ballot box. Read-only, so safe to repeat.
pub async fn tally_store<S: BallotStore + ?Sized>(
    store: &S,
    cipher: &BallotCipher,
    contests: &Contests,
) -> Result<TallyReport, StoreError> {
    let ballots = store.list_all().await?;
    Ok(tally_ballots(&ballots, cipher, contests))
}
