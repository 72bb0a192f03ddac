use serde::{Deserialize, Serialize};

use crate::model::common::VoterKey;
use crate::token::Token;

/// Voters to issue offline tokens to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRequest {
    pub voters: Vec<VoterKey>,
}

/// A token presented at a polling station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLogin {
    pub token: Token,
}

/// The voter a token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIdentity {
    pub voter: VoterKey,
}
