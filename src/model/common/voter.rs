use std::fmt::{Display, Formatter};

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// The key under which the external voter registry knows a voter,
/// e.g. their institutional email address.
///
/// This never appears next to ballot data.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterKey(String);

impl VoterKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VoterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VoterKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VoterKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<VoterKey> for Bson {
    fn from(key: VoterKey) -> Self {
        Bson::String(key.0)
    }
}

/// How a voter casts their ballot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteMethod {
    /// Signed in through the external identity provider.
    Online,
    /// Signed in at a polling station with a one-time token.
    Offline,
}

impl VoteMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteMethod::Online => "online",
            VoteMethod::Offline => "offline",
        }
    }
}

impl From<VoteMethod> for Bson {
    fn from(method: VoteMethod) -> Self {
        Bson::String(method.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::to_bson;

    use super::*;

    #[test]
    fn vote_methods_match_their_serde_names() {
        for method in [VoteMethod::Online, VoteMethod::Offline] {
            assert_eq!(Bson::from(method), to_bson(&method).unwrap());
        }
        assert_eq!(Bson::from(VoteMethod::Offline), Bson::String("offline".into()));
    }
}
