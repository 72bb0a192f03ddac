//! Authenticated encryption of ballot preferences.
//!
//! Ballots are sealed with AES-256-GCM using a fresh random 16-byte IV per
//! ballot and a detached 16-byte tag. Any modification of the ciphertext,
//! IV or tag makes the ballot fail its integrity check when opened.

use std::fmt::{Debug, Formatter};

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    aes::Aes256,
    AesGcm,
};
use generic_array::GenericArray;
use rand::RngCore;
use rocket::serde::json::serde_json;
use serde::Deserialize;
use thiserror::Error;
use typenum::U16;

use crate::kdf::{Argon2Error, Argon2Params};
use crate::model::{
    common::{BallotPreference, HexBytes},
    db::{EncryptedBallot, SealedBallot},
};

pub const IV_LENGTH: usize = 16;
pub const TAG_LENGTH: usize = 16;
pub const KEY_LENGTH: usize = 32;

/// AES-256-GCM with a 128-bit IV.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

#[derive(Debug, Error)]
pub enum CipherError {
    /// The tag did not match: wrong key, or the record was tampered with.
    #[error("ballot failed its integrity check")]
    Integrity,
    /// The record could not even be interpreted as a sealed ballot.
    #[error("malformed ballot: {0}")]
    Decryption(String),
    #[error("failed to seal ballot")]
    Encryption,
    #[error("failed to derive ballot key: {0}")]
    KeyDerivation(#[from] Argon2Error),
}

/// Everything needed to derive the ballot key.
/// The secret is supplied from outside (configuration or environment).
#[derive(Clone, Deserialize)]
pub struct CipherConfig {
    pub secret: String,
    pub salt: String,
    #[serde(default)]
    pub kdf: Argon2Params,
}

impl Debug for CipherConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherConfig")
            .field("secret", &"<redacted>")
            .field("salt", &"<redacted>")
            .field("kdf", &self.kdf)
            .finish()
    }
}

/// The symmetric ballot key. Never persisted, never printed.
pub struct BallotKey([u8; KEY_LENGTH]);

impl BallotKey {
    /// Stretch the configured secret into a key. Slow; do it once per process.
    pub fn derive(config: &CipherConfig) -> Result<Self, CipherError> {
        let bytes = config.kdf.derive(
            config.secret.as_bytes(),
            config.salt.as_bytes(),
            KEY_LENGTH as u32,
        )?;
        let mut key = [0_u8; KEY_LENGTH];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl Debug for BallotKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("BallotKey(<redacted>)")
    }
}

/// Seals and opens ballot preferences under a single key.
pub struct BallotCipher {
    aead: Aes256Gcm16,
}

impl BallotCipher {
    /// Derive the key from `config` and build a cipher around it.
    pub fn new(config: &CipherConfig) -> Result<Self, CipherError> {
        Ok(Self::from_key(&BallotKey::derive(config)?))
    }

    pub fn from_key(key: &BallotKey) -> Self {
        Self {
            aead: Aes256Gcm16::new(GenericArray::from_slice(&key.0)),
        }
    }

    /// Seal one position's preference under a fresh random IV.
    pub fn encrypt(&self, preference: &BallotPreference) -> Result<SealedBallot, CipherError> {
        let mut buffer = serde_json::to_vec(preference).map_err(|_| CipherError::Encryption)?;

        let mut iv = GenericArray::<u8, U16>::default();
        rand::thread_rng().fill_bytes(iv.as_mut_slice());

        let tag = self
            .aead
            .encrypt_in_place_detached(&iv, b"", &mut buffer)
            .map_err(|_| CipherError::Encryption)?;

        Ok(SealedBallot {
            ciphertext: buffer,
            iv: iv.to_vec(),
            auth_tag: tag.to_vec(),
        })
    }

    /// Open sealed ballot data, checking its tag.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8],
        auth_tag: &[u8],
    ) -> Result<BallotPreference, CipherError> {
        if iv.len() != IV_LENGTH {
            return Err(CipherError::Decryption(format!(
                "IV must be {IV_LENGTH} bytes, got {}",
                iv.len()
            )));
        }
        if auth_tag.len() != TAG_LENGTH {
            return Err(CipherError::Decryption(format!(
                "auth tag must be {TAG_LENGTH} bytes, got {}",
                auth_tag.len()
            )));
        }

        let mut buffer = ciphertext.to_vec();
        self.aead
            .decrypt_in_place_detached(
                GenericArray::from_slice(iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(auth_tag),
            )
            .map_err(|_| CipherError::Integrity)?;

        serde_json::from_slice(&buffer).map_err(|err| CipherError::Decryption(err.to_string()))
    }

    /// Open a stored ballot. Malformed hex in any field makes only this
    /// ballot unreadable.
    pub fn open(&self, ballot: &EncryptedBallot) -> Result<BallotPreference, CipherError> {
        let decode = |field: &str, hex: &HexBytes| {
            hex.decode()
                .map_err(|err| CipherError::Decryption(format!("{field} is not valid hex: {err}")))
        };
        let ciphertext = decode("ciphertext", &ballot.ciphertext)?;
        let iv = decode("iv", &ballot.iv)?;
        let auth_tag = decode("auth_tag", &ballot.auth_tag)?;
        self.decrypt(&ciphertext, &iv, &auth_tag)
    }
}

impl Debug for BallotCipher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("BallotCipher(<redacted>)")
    }
}

/// Example data for tests.
#[cfg(test)]
pub mod examples {
    use super::*;

    impl CipherConfig {
        pub fn example() -> Self {
            Self {
                secret: "correct horse battery staple".to_string(),
                salt: "ballot-box-test-salt".to_string(),
                kdf: Argon2Params::example(),
            }
        }
    }

    impl BallotCipher {
        /// A cipher over a fixed key, skipping key derivation.
        pub fn example() -> Self {
            Self::from_key(&BallotKey::from_bytes([42; KEY_LENGTH]))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::common::examples::ranking;

    #[test]
    fn roundtrip() {
        let cipher = BallotCipher::example();
        let preferences = [
            BallotPreference::example(),
            BallotPreference::abstain("senator".into()),
            BallotPreference::new("chair".into(), ranking(&["bob"])),
        ];
        for preference in preferences {
            let sealed = cipher.encrypt(&preference).unwrap();
            assert_eq!(sealed.iv.len(), IV_LENGTH);
            assert_eq!(sealed.auth_tag.len(), TAG_LENGTH);
            let opened = cipher
                .decrypt(&sealed.ciphertext, &sealed.iv, &sealed.auth_tag)
                .unwrap();
            assert_eq!(opened, preference);
        }
    }

    #[test]
    fn encryption_is_not_deterministic() {
        let cipher = BallotCipher::example();
        let preference = BallotPreference::example();
        let first = cipher.encrypt(&preference).unwrap();
        let second = cipher.encrypt(&preference).unwrap();
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn tampering_is_detected() {
        let cipher = BallotCipher::example();
        let sealed = cipher.encrypt(&BallotPreference::example()).unwrap();

        let mut ciphertext = sealed.ciphertext.clone();
        ciphertext[0] ^= 0x01;
        assert!(matches!(
            cipher.decrypt(&ciphertext, &sealed.iv, &sealed.auth_tag),
            Err(CipherError::Integrity)
        ));

        let mut iv = sealed.iv.clone();
        iv[15] ^= 0x80;
        assert!(matches!(
            cipher.decrypt(&sealed.ciphertext, &iv, &sealed.auth_tag),
            Err(CipherError::Integrity)
        ));

        let mut tag = sealed.auth_tag.clone();
        tag[3] ^= 0x10;
        assert!(matches!(
            cipher.decrypt(&sealed.ciphertext, &sealed.iv, &tag),
            Err(CipherError::Integrity)
        ));
    }

    #[test]
    fn wrong_key_is_detected() {
        let sealed = BallotCipher::example()
            .encrypt(&BallotPreference::example())
            .unwrap();
        let other = BallotCipher::from_key(&BallotKey::from_bytes([7; KEY_LENGTH]));
        assert!(matches!(
            other.decrypt(&sealed.ciphertext, &sealed.iv, &sealed.auth_tag),
            Err(CipherError::Integrity)
        ));
    }

    #[test]
    fn malformed_input_is_rejected() {
        let cipher = BallotCipher::example();
        let sealed = cipher.encrypt(&BallotPreference::example()).unwrap();
        assert!(matches!(
            cipher.decrypt(&sealed.ciphertext, &sealed.iv[..12], &sealed.auth_tag),
            Err(CipherError::Decryption(_))
        ));
        assert!(matches!(
            cipher.decrypt(&sealed.ciphertext, &sealed.iv, &[]),
            Err(CipherError::Decryption(_))
        ));
    }

    #[test]
    fn malformed_hex_is_unreadable() {
        let cipher = BallotCipher::example();
        let sealed = cipher.encrypt(&BallotPreference::example()).unwrap();
        let mut ballot = EncryptedBallot::new(sealed, chrono::Utc::now());
        assert!(cipher.open(&ballot).is_ok());

        ballot.iv = "zz".into();
        assert!(matches!(
            cipher.open(&ballot),
            Err(CipherError::Decryption(_))
        ));
    }

    #[test]
    fn derived_keys_agree() {
        let config = CipherConfig::example();
        let sealer = BallotCipher::new(&config).unwrap();
        let opener = BallotCipher::new(&config).unwrap();
        let ballot = EncryptedBallot::new(
            sealer.encrypt(&BallotPreference::example()).unwrap(),
            Utc::now(),
        );
        assert_eq!(opener.open(&ballot).unwrap(), BallotPreference::example());
    }

    #[test]
    fn secrets_are_not_printed() {
        let config = CipherConfig::example();
        let printed = format!("{config:?} {:?}", BallotKey::derive(&config).unwrap());
        assert!(!printed.contains(&config.secret));
        assert!(!printed.contains(&config.salt));
    }
}
