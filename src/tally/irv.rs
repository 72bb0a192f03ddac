//! Instant-runoff counting for a single position.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::common::CandidateId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TallyError {
    #[error("there are no ballots to count")]
    NoBallots,
    #[error("there are no candidates to count")]
    NoCandidates,
    #[error("tally invariant violated: {0}")]
    InvariantViolation(String),
}

/// One round of counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyRound {
    pub round_number: u32,
    /// First preferences among the candidates still standing, including zeros.
    pub vote_counts: BTreeMap<CandidateId, u64>,
    /// Ballots with no candidate left standing this round.
    pub exhausted: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated: Option<CandidateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<CandidateId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyResult {
    pub winner: CandidateId,
    pub rounds: Vec<TallyRound>,
    pub total_ballots_counted: u64,
}

/// Run instant-runoff voting over `ballots`, each a ranking with the most
/// preferred candidate first.
///
/// Candidates on a ballot that are not in `candidates` are ignored, as are
/// repeat appearances of a candidate already ranked higher.
pub fn run_irv(
    ballots: &[Vec<CandidateId>],
    candidates: &[CandidateId],
) -> Result<TallyResult, TallyError> {
    // Each round but the last eliminates a candidate.
    let max_rounds = candidates.len() as u32 + 2;
    run_with_round_cap(ballots, candidates, max_rounds)
}

fn run_with_round_cap(
    ballots: &[Vec<CandidateId>],
    candidates: &[CandidateId],
    max_rounds: u32,
) -> Result<TallyResult, TallyError> {
    if ballots.is_empty() {
        return Err(TallyError::NoBallots);
    }
    if candidates.is_empty() {
        return Err(TallyError::NoCandidates);
    }

    let mut remaining: BTreeSet<&CandidateId> = candidates.iter().collect();
    let mut rounds = Vec::new();

    for round_number in 1..=max_rounds {
        let (vote_counts, exhausted) = count_round(ballots, &remaining);
        let mut round = TallyRound {
            round_number,
            vote_counts,
            exhausted,
            eliminated: None,
            winner: None,
        };

        let winner = match remaining.len() {
            0 => {
                return Err(TallyError::InvariantViolation(format!(
                    "no candidates remain in round {round_number}"
                )))
            }
            1 => remaining.iter().next().map(|&c| c.clone()),
            _ => majority_winner(&round.vote_counts),
        };

        if let Some(winner) = winner {
            round.winner = Some(winner.clone());
            rounds.push(round);
            return Ok(TallyResult {
                winner,
                rounds,
                total_ballots_counted: ballots.len() as u64,
            });
        }

        let loser = elimination_candidate(&round.vote_counts)
            .cloned()
            .ok_or_else(|| {
                TallyError::InvariantViolation(format!(
                    "nobody to eliminate in round {round_number}"
                ))
            })?;
        remaining.remove(&loser);
        round.eliminated = Some(loser);
        rounds.push(round);
    }

    Err(TallyError::InvariantViolation(format!(
        "no winner after {max_rounds} rounds"
    )))
}

/// Count each ballot for its highest-ranked candidate still standing.
fn count_round(
    ballots: &[Vec<CandidateId>],
    remaining: &BTreeSet<&CandidateId>,
) -> (BTreeMap<CandidateId, u64>, u64) {
    let mut counts: BTreeMap<CandidateId, u64> =
        remaining.iter().map(|&c| (c.clone(), 0)).collect();
    let mut exhausted = 0;
    for ballot in ballots {
        match ballot.iter().find(|c| remaining.contains(c)) {
            Some(choice) => {
                if let Some(count) = counts.get_mut(choice) {
                    *count += 1;
                }
            }
            None => exhausted += 1,
        }
    }
    (counts, exhausted)
}

/// The candidate with strictly more than half of this round's votes, if any.
fn majority_winner(counts: &BTreeMap<CandidateId, u64>) -> Option<CandidateId> {
    let total: u64 = counts.values().sum();
    counts
        .iter()
        .find(|&(_, &count)| count * 2 > total)
        .map(|(candidate, _)| candidate.clone())
}

/// The candidate to eliminate: the lowest count, with ties going to the
/// smallest candidate ID.
fn elimination_candidate(counts: &BTreeMap<CandidateId, u64>) -> Option<&CandidateId> {
    // `min_by_key` keeps the first of equal minima, and the map is sorted by ID.
    counts
        .iter()
        .min_by_key(|&(_, &count)| count)
        .map(|(candidate, _)| candidate)
}

impl Display for TallyResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Winner: {}", self.winner)?;
        writeln!(f, "Ballots counted: {}", self.total_ballots_counted)?;
        for round in &self.rounds {
            writeln!(f, "Round {}:", round.round_number)?;
            let mut counts: Vec<_> = round.vote_counts.iter().collect();
            counts.sort_by(|(a, x), (b, y)| y.cmp(x).then_with(|| a.cmp(b)));
            for (candidate, count) in counts {
                writeln!(f, "  {candidate}: {count}")?;
            }
            if round.exhausted > 0 {
                writeln!(f, "  (exhausted: {})", round.exhausted)?;
            }
            if let Some(eliminated) = &round.eliminated {
                writeln!(f, "  Eliminated: {eliminated}")?;
            }
            if let Some(winner) = &round.winner {
                writeln!(f, "  Winner: {winner}")?;
            }
        }
        Ok(())
    }
}
