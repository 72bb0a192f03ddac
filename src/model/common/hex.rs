use std::fmt::{Display, Formatter};

use data_encoding::{DecodeError, HEXLOWER, HEXLOWER_PERMISSIVE};
use serde::{Deserialize, Serialize};

/// A byte buffer in its lowercase hex form.
///
/// Loading a record never decodes these; a malformed buffer only surfaces
/// when the record is actually used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HexBytes(String);

impl HexBytes {
    pub fn encode(bytes: &[u8]) -> Self {
        Self(HEXLOWER.encode(bytes))
    }

    pub fn decode(&self) -> Result<Vec<u8>, DecodeError> {
        HEXLOWER_PERMISSIVE.decode(self.0.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for HexBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for HexBytes {
    fn from(hex: String) -> Self {
        Self(hex)
    }
}

impl From<&str> for HexBytes {
    fn from(hex: &str) -> Self {
        Self(hex.to_string())
    }
}
