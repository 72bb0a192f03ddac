use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// The name of a contested position, e.g. `chair` or `senator`.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(String);

/// A candidate identifier.
///
/// Ordering is byte-wise lexicographic over the identifier, which is the
/// ordering used to break elimination ties during a tally.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

macro_rules! string_newtype {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<$name> for Bson {
            fn from(value: $name) -> Self {
                Bson::String(value.0)
            }
        }
    };
}

string_newtype!(Position);
string_newtype!(CandidateId);

/// The positions being contested, each with its candidates.
pub type Contests = BTreeMap<Position, Vec<CandidateId>>;

/// One voter's ranking for a single position, most preferred first.
/// An empty ranking is an abstention for that position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotPreference {
    pub position: Position,
    pub ranking: Vec<CandidateId>,
}

impl BallotPreference {
    pub fn new(position: Position, ranking: Vec<CandidateId>) -> Self {
        Self { position, ranking }
    }

    /// An abstention for the given position.
    pub fn abstain(position: Position) -> Self {
        Self::new(position, Vec::new())
    }

    pub fn is_abstention(&self) -> bool {
        self.ranking.is_empty()
    }
}
