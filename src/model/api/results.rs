use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::common::Position;
use crate::store::Turnout;
use crate::tally::{Participation, TallyReport, TallyResult};

/// The outcome of tallying one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PositionResult {
    Decided(TallyResult),
    Failed { reason: String },
}

/// Election results, as published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsReport {
    pub participation: Participation,
    pub turnout: Turnout,
    pub positions: BTreeMap<Position, PositionResult>,
}

impl ResultsReport {
    pub fn new(report: TallyReport, turnout: Turnout) -> Self {
        let positions = report
            .positions
            .into_iter()
            .map(|(position, result)| {
                let result = match result {
                    Ok(result) => PositionResult::Decided(result),
                    Err(err) => PositionResult::Failed {
                        reason: err.to_string(),
                    },
                };
                (position, result)
            })
            .collect();
        Self {
            participation: report.participation,
            turnout,
            positions,
        }
    }
}
