use serde::{Deserialize, Serialize};

use crate::model::common::{VoteMethod, VoterKey};
use crate::token::TokenDigest;

/// A voter from the external voter registry, as stored in the database.
///
/// The registry owns these records; this backend only ever flips
/// `has_voted` (once, at cast time) and sets or clears `token_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    /// Registry key, e.g. the voter's email address.
    #[serde(rename = "_id")]
    pub key: VoterKey,
    /// Digest of the voter's one-time token, if one has been issued and not yet used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_hash: Option<TokenDigest>,
    pub has_voted: bool,
    pub is_eligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_method: Option<VoteMethod>,
}

impl VoterRecord {
    /// A freshly imported, eligible voter.
    pub fn new(key: VoterKey, vote_method: Option<VoteMethod>) -> Self {
        Self {
            key,
            token_hash: None,
            has_voted: false,
            is_eligible: true,
            vote_method,
        }
    }

    /// Can this voter still cast a ballot?
    pub fn may_vote(&self) -> bool {
        self.is_eligible && !self.has_voted
    }
}
