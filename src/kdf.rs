//! Argon2id, used both to stretch the ballot secret into a cipher key and
//! to digest one-time tokens.

use argon2::{Config, Variant, Version};
use serde::{Deserialize, Serialize};

pub use argon2::Error as Argon2Error;

/// Argon2id cost parameters. These are not secret.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    /// Memory cost in KiB.
    #[serde(default = "default_mem_cost")]
    pub mem_cost: u32,
    /// Number of passes.
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,
}

// 19 MiB, 2 passes:
//  https://cheatsheetseries.owasp.org/cheatsheets/Password_Storage_Cheat_Sheet.html
fn default_mem_cost() -> u32 {
    19 * 1024
}

fn default_time_cost() -> u32 {
    2
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            mem_cost: default_mem_cost(),
            time_cost: default_time_cost(),
        }
    }
}

impl Argon2Params {
    /// Cheap parameters for tests.
    #[cfg(test)]
    pub fn example() -> Self {
        Self {
            mem_cost: 64,
            time_cost: 1,
        }
    }

    /// Derive `length` bytes from `input` and `salt`.
    ///
    /// Fails if the salt is shorter than 8 bytes or the parameters are out of range.
    pub fn derive(&self, input: &[u8], salt: &[u8], length: u32) -> Result<Vec<u8>, Argon2Error> {
        let config = Config {
            variant: Variant::Argon2id,
            version: Version::Version13,
            mem_cost: self.mem_cost,
            time_cost: self.time_cost,
            lanes: 1,
            hash_length: length,
            ..Config::default()
        };
        argon2::hash_raw(input, salt, &config)
    }
}
