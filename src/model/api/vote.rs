use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::common::{BallotPreference, CandidateId, Contests, Position, VoterKey};
use crate::token::Token;

/// A voter's ranking for one position, as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotSubmission {
    pub position: Position,
    /// Most preferred first. Empty to abstain.
    #[serde(default)]
    pub ranked_candidate_ids: Vec<CandidateId>,
}

/// A request to cast a vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastRequest {
    /// The authenticated voter, as vouched for by the submitting front end.
    pub voter: VoterKey,
    /// Required for offline voters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    pub ballots: Vec<BallotSubmission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("unknown position '{0}'")]
    UnknownPosition(Position),
    #[error("position '{0}' was submitted more than once")]
    DuplicatePosition(Position),
    #[error("'{candidate}' is not standing for '{position}'")]
    UnknownCandidate {
        position: Position,
        candidate: CandidateId,
    },
    #[error("'{candidate}' is ranked more than once for '{position}'")]
    DuplicateCandidate {
        position: Position,
        candidate: CandidateId,
    },
}

impl CastRequest {
    /// Check the submission against the configured contests and produce one
    /// preference per contest, in contest order. Contests the voter left out
    /// become abstentions.
    pub fn preferences(&self, contests: &Contests) -> Result<Vec<BallotPreference>, SubmissionError> {
        let mut submitted: BTreeMap<&Position, &[CandidateId]> = BTreeMap::new();
        for ballot in &self.ballots {
            let candidates = contests
                .get(&ballot.position)
                .ok_or_else(|| SubmissionError::UnknownPosition(ballot.position.clone()))?;

            let mut seen = BTreeSet::new();
            for candidate in &ballot.ranked_candidate_ids {
                if !candidates.contains(candidate) {
                    return Err(SubmissionError::UnknownCandidate {
                        position: ballot.position.clone(),
                        candidate: candidate.clone(),
                    });
                }
                if !seen.insert(candidate) {
                    return Err(SubmissionError::DuplicateCandidate {
                        position: ballot.position.clone(),
                        candidate: candidate.clone(),
                    });
                }
            }

            if submitted
                .insert(&ballot.position, &ballot.ranked_candidate_ids)
                .is_some()
            {
                return Err(SubmissionError::DuplicatePosition(ballot.position.clone()));
            }
        }

        Ok(contests
            .keys()
            .map(|position| {
                let ranking = submitted
                    .get(position)
                    .map(|ranking| ranking.to_vec())
                    .unwrap_or_default();
                BallotPreference::new(position.clone(), ranking)
            })
            .collect())
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;
    use crate::model::common::examples::ranking;

    impl CastRequest {
        pub fn example(voter: &VoterKey) -> Self {
            Self {
                voter: voter.clone(),
                token: None,
                ballots: vec![
                    BallotSubmission {
                        position: "chair".into(),
                        ranked_candidate_ids: ranking(&["alice", "bob"]),
                    },
                    BallotSubmission {
                        position: "senator".into(),
                        ranked_candidate_ids: ranking(&["dave"]),
                    },
                ],
            }
        }
    }
}
