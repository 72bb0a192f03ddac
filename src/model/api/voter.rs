use serde::{Deserialize, Serialize};

use crate::model::common::{VoteMethod, VoterKey};

/// A voter who may still vote, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterStatus {
    pub voter: VoterKey,
    pub vote_method: Option<VoteMethod>,
    /// Whether a cast must carry the voter's one-time token.
    pub token_required: bool,
}
