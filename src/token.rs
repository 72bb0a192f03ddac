//! One-time voting tokens for offline voters.
//!
//! Plaintext tokens exist only in memory, long enough to be handed to the
//! registrar. The database only ever sees a [`TokenDigest`].

use std::collections::HashSet;
use std::fmt::{Debug, Display, Formatter};

use log::{debug, error, info, warn};
use mongodb::bson::Bson;
use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::kdf::{Argon2Error, Argon2Params};
use crate::model::common::VoterKey;
use crate::retry::{self, Attempt, RetryError};
use crate::store::{StoreError, VoterRegistry};

/// How many fresh tokens to try before giving up on finding an unused one.
pub const MAX_ISSUE_ATTEMPTS: u32 = 10;

/// Length of a token digest, in bytes.
const DIGEST_LENGTH: u32 = 32;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no unused token found after {attempts} attempts")]
    CollisionExhausted { attempts: u32 },
    #[error("failed to hash token: {0}")]
    Hash(#[from] Argon2Error),
}

/// The alphabet tokens are drawn from.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenFormat {
    /// Lowercase hexadecimal.
    #[default]
    Hex,
    /// Decimal digits only, easier to read out over the phone.
    Numeric,
}

/// How new tokens should look.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPolicy {
    #[serde(default)]
    pub format: TokenFormat,
    #[serde(default = "default_token_length")]
    pub length: usize,
}

fn default_token_length() -> usize {
    32
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            format: TokenFormat::default(),
            length: default_token_length(),
        }
    }
}

/// A plaintext one-time token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Generate a random token.
    pub fn generate(policy: TokenPolicy) -> Self {
        let radix = match policy.format {
            TokenFormat::Hex => 16,
            TokenFormat::Numeric => 10,
        };
        let digit_dist = Uniform::from(0..radix);
        let mut rng = rand::thread_rng();
        let token = (0..policy.length)
            .filter_map(|_| char::from_digit(digit_dist.sample(&mut rng), radix))
            .collect();
        Self(token)
    }

    /// The token itself, for handing to the voter.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Token {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for Token {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// The stored, irreversible digest of a token, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenDigest(String);

impl TokenDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TokenDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TokenDigest> for Bson {
    fn from(digest: TokenDigest) -> Self {
        Bson::String(digest.0)
    }
}

/// Hashes tokens with Argon2id under a server-side pepper.
///
/// The pepper stands in for a per-token salt so that a presented token can
/// be looked up by digest.
#[derive(Clone)]
pub struct TokenHasher {
    pepper: Vec<u8>,
    params: Argon2Params,
}

impl TokenHasher {
    /// Fails if the pepper or parameters are unusable.
    pub fn new(pepper: impl Into<Vec<u8>>, params: Argon2Params) -> Result<Self, TokenError> {
        let hasher = Self {
            pepper: pepper.into(),
            params,
        };
        hasher.hash(&Token::from(""))?;
        Ok(hasher)
    }

    pub fn hash(&self, token: &Token) -> Result<TokenDigest, TokenError> {
        let digest = self
            .params
            .derive(token.0.as_bytes(), &self.pepper, DIGEST_LENGTH)?;
        Ok(TokenDigest(data_encoding::HEXLOWER.encode(&digest)))
    }

    /// Check a presented token against a stored digest in constant time.
    pub fn verify(&self, token: &Token, stored: &TokenDigest) -> Result<bool, TokenError> {
        let presented = self.hash(token)?;
        Ok(presented
            .0
            .as_bytes()
            .ct_eq(stored.0.as_bytes())
            .into())
    }
}

impl Debug for TokenHasher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHasher")
            .field("pepper", &"<redacted>")
            .field("params", &self.params)
            .finish()
    }
}

/// Mints tokens whose digests are not already taken.
#[derive(Debug, Clone, Copy)]
pub struct TokenIssuer<'a> {
    hasher: &'a TokenHasher,
    policy: TokenPolicy,
}

impl<'a> TokenIssuer<'a> {
    pub fn new(hasher: &'a TokenHasher, policy: TokenPolicy) -> Self {
        Self { hasher, policy }
    }

    /// Generate a fresh token whose digest is not in `taken`.
    pub fn issue(&self, taken: &HashSet<TokenDigest>) -> Result<(Token, TokenDigest), TokenError> {
        let policy = self.policy;
        self.issue_with(taken, || Token::generate(policy))
    }

    /// Like [`Self::issue`], drawing candidates from `generate`.
    pub fn issue_with(
        &self,
        taken: &HashSet<TokenDigest>,
        mut generate: impl FnMut() -> Token,
    ) -> Result<(Token, TokenDigest), TokenError> {
        retry::bounded(MAX_ISSUE_ATTEMPTS, |attempt| {
            let token = generate();
            match self.hasher.hash(&token) {
                Ok(digest) if taken.contains(&digest) => {
                    debug!("Generated token collides with an existing one (attempt {attempt})");
                    Attempt::Retry
                }
                Ok(digest) => Attempt::Done((token, digest)),
                Err(err) => Attempt::Fail(err),
            }
        })
        .map_err(|err| match err {
            RetryError::Exhausted { attempts } => TokenError::CollisionExhausted { attempts },
            RetryError::Failed(err) => err,
        })
    }
}

/// A token handed out to a voter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub voter: VoterKey,
    pub token: Token,
}

/// Why a voter in a batch did not get a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuanceFailure {
    NotRegistered,
    NotEligible,
    AlreadyVoted,
    /// The voter appeared earlier in the same batch.
    Duplicate,
    Collision,
    HashingFailed,
    /// The voter's record could not be read or written.
    StoreError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedIssuance {
    pub voter: VoterKey,
    pub reason: IssuanceFailure,
}

/// Outcome of issuing tokens to a batch of voters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuanceReport {
    pub issued: Vec<IssuedToken>,
    pub failed: Vec<FailedIssuance>,
}

/// Issue a token to each voter in `voters`, switching them to offline voting.
///
/// Voters that cannot receive a token are reported rather than aborting the
/// batch, including on a store error for a single voter. A voter listed
/// more than once gets one token. Any token a voter held before is replaced.
pub async fn issue_batch<R: VoterRegistry + ?Sized>(
    registry: &R,
    issuer: &TokenIssuer<'_>,
    voters: &[VoterKey],
) -> Result<IssuanceReport, StoreError> {
    let mut taken = registry.token_digests().await?;
    let mut report = IssuanceReport::default();
    let mut seen = HashSet::new();

    for voter in voters {
        let reject = |reason| {
            warn!("Not issuing a token to {voter}: {reason:?}");
            FailedIssuance {
                voter: voter.clone(),
                reason,
            }
        };
        if !seen.insert(voter) {
            report.failed.push(reject(IssuanceFailure::Duplicate));
            continue;
        }
        let record = match registry.voter(voter).await {
            Ok(record) => record,
            Err(err) => {
                error!("Failed to look up {voter}: {err}");
                report.failed.push(reject(IssuanceFailure::StoreError));
                continue;
            }
        };
        let failure = match record {
            None => Some(IssuanceFailure::NotRegistered),
            Some(record) if !record.is_eligible => Some(IssuanceFailure::NotEligible),
            Some(record) if record.has_voted => Some(IssuanceFailure::AlreadyVoted),
            Some(_) => None,
        };
        if let Some(reason) = failure {
            report.failed.push(reject(reason));
            continue;
        }

        let (token, digest) = match issuer.issue(&taken) {
            Ok(issued) => issued,
            Err(TokenError::CollisionExhausted { .. }) => {
                report.failed.push(reject(IssuanceFailure::Collision));
                continue;
            }
            Err(TokenError::Hash(err)) => {
                warn!("Token hashing failed: {err}");
                report.failed.push(reject(IssuanceFailure::HashingFailed));
                continue;
            }
        };

        match registry.assign_token(voter, &digest).await {
            Ok(true) => {
                taken.insert(digest);
                report.issued.push(IssuedToken {
                    voter: voter.clone(),
                    token,
                });
            }
            // The voter voted or was removed between the check and the write.
            Ok(false) => report.failed.push(reject(IssuanceFailure::AlreadyVoted)),
            Err(StoreError::DuplicateKey) => {
                report.failed.push(reject(IssuanceFailure::Collision))
            }
            Err(err) => {
                error!("Failed to store a token for {voter}: {err}");
                report.failed.push(reject(IssuanceFailure::StoreError));
            }
        }
    }

    info!(
        "Issued {} token(s), {} failed",
        report.issued.len(),
        report.failed.len()
    );
    Ok(report)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{common::VoteMethod, db::VoterRecord};
    use crate::store::MemoryStore;

    #[test]
    fn generated_tokens_follow_policy() {
        let hex = Token::generate(TokenPolicy {
            format: TokenFormat::Hex,
            length: 24,
        });
        assert_eq!(hex.expose().len(), 24);
        assert!(hex.expose().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!hex.expose().chars().any(|c| c.is_ascii_uppercase()));

        let numeric = Token::generate(TokenPolicy {
            format: TokenFormat::Numeric,
            length: 8,
        });
        assert_eq!(numeric.expose().len(), 8);
        assert!(numeric.expose().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn hashing_is_deterministic_and_verifiable() {
        let hasher = TokenHasher::example();
        let token = Token::from("0123456789abcdef");
        let digest = hasher.hash(&token).unwrap();
        assert_eq!(digest, hasher.hash(&token).unwrap());
        assert_ne!(digest.as_str(), token.expose());
        assert!(hasher.verify(&token, &digest).unwrap());
        assert!(!hasher.verify(&Token::from("0123456789abcdee"), &digest).unwrap());
    }

    #[test]
    fn pepper_matters() {
        let token = Token::from("0123456789abcdef");
        let other = TokenHasher::new("another-pepper", Argon2Params::example()).unwrap();
        let digest = TokenHasher::example().hash(&token).unwrap();
        assert!(!other.verify(&token, &digest).unwrap());
    }

    #[test]
    fn short_pepper_is_rejected() {
        assert!(matches!(
            TokenHasher::new("pep", Argon2Params::example()),
            Err(TokenError::Hash(_))
        ));
    }

    #[test]
    fn issuer_skips_taken_digests() {
        let hasher = TokenHasher::example();
        let issuer = TokenIssuer::new(&hasher, TokenPolicy::default());
        let taken = HashSet::from([hasher.hash(&Token::from("aaaa")).unwrap()]);

        let mut candidates = vec!["bbbb", "aaaa", "aaaa"];
        let (token, digest) = issuer
            .issue_with(&taken, || Token::from(candidates.pop().unwrap()))
            .unwrap();
        assert_eq!(token.expose(), "bbbb");
        assert!(!taken.contains(&digest));
    }

    #[test]
    fn issuer_gives_up_after_bounded_attempts() {
        let hasher = TokenHasher::example();
        let issuer = TokenIssuer::new(&hasher, TokenPolicy::default());
        let taken = HashSet::from([hasher.hash(&Token::from("aaaa")).unwrap()]);

        let mut generated = 0;
        let result = issuer.issue_with(&taken, || {
            generated += 1;
            Token::from("aaaa")
        });
        assert!(matches!(
            result,
            Err(TokenError::CollisionExhausted {
                attempts: MAX_ISSUE_ATTEMPTS
            })
        ));
        assert_eq!(generated, MAX_ISSUE_ATTEMPTS);
    }

    #[rocket::async_test]
    async fn batch_issuance_reports_partial_failure() {
        let store = MemoryStore::default();
        let ready = VoterRecord::new("ready@example.edu".into(), Some(VoteMethod::Online));
        let voted = VoterRecord {
            has_voted: true,
            ..VoterRecord::new("voted@example.edu".into(), None)
        };
        store.insert_voter(ready.clone()).await;
        store.insert_voter(voted.clone()).await;
        store.insert_voter(VoterRecord::example_ineligible()).await;

        let hasher = TokenHasher::example();
        let issuer = TokenIssuer::new(&hasher, TokenPolicy::default());
        let report = issue_batch(
            &store,
            &issuer,
            &[
                ready.key.clone(),
                voted.key.clone(),
                VoterRecord::example_ineligible().key,
                "stranger@example.edu".into(),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.issued.len(), 1);
        assert_eq!(report.issued[0].voter, ready.key);
        let reasons: Vec<_> = report.failed.iter().map(|f| f.reason).collect();
        assert_eq!(
            reasons,
            vec![
                IssuanceFailure::AlreadyVoted,
                IssuanceFailure::NotEligible,
                IssuanceFailure::NotRegistered,
            ]
        );

        // Only the digest is stored, and the voter is now offline.
        let stored = store.voter(&ready.key).await.unwrap().unwrap();
        let digest = stored.token_hash.unwrap();
        assert!(hasher.verify(&report.issued[0].token, &digest).unwrap());
        assert_eq!(stored.vote_method, Some(VoteMethod::Offline));
    }

    #[rocket::async_test]
    async fn reissuing_replaces_the_old_token() {
        let store = MemoryStore::default();
        let voter = VoterRecord::example_offline();
        store.insert_voter(voter.clone()).await;

        let hasher = TokenHasher::example();
        let issuer = TokenIssuer::new(&hasher, TokenPolicy::default());
        let keys = [voter.key.clone()];
        let first = issue_batch(&store, &issuer, &keys).await.unwrap();
        let second = issue_batch(&store, &issuer, &keys).await.unwrap();

        let digest = store.voter(&voter.key).await.unwrap().unwrap().token_hash.unwrap();
        assert!(!hasher.verify(&first.issued[0].token, &digest).unwrap());
        assert!(hasher.verify(&second.issued[0].token, &digest).unwrap());
    }

    #[rocket::async_test]
    async fn repeated_voters_get_one_token() {
        let store = MemoryStore::default();
        let voter = VoterRecord::example_offline();
        store.insert_voter(voter.clone()).await;

        let hasher = TokenHasher::example();
        let issuer = TokenIssuer::new(&hasher, TokenPolicy::default());
        let keys = [voter.key.clone(), voter.key.clone()];
        let report = issue_batch(&store, &issuer, &keys).await.unwrap();

        assert_eq!(report.issued.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].reason, IssuanceFailure::Duplicate);
        let digest = store.voter(&voter.key).await.unwrap().unwrap().token_hash.unwrap();
        assert!(hasher.verify(&report.issued[0].token, &digest).unwrap());
    }

    /// A registry that cannot read one particular voter.
    struct FlakyRegistry {
        inner: MemoryStore,
        broken: VoterKey,
    }

    #[rocket::async_trait]
    impl VoterRegistry for FlakyRegistry {
        async fn voter(&self, key: &VoterKey) -> Result<Option<VoterRecord>, StoreError> {
            if *key == self.broken {
                return Err(StoreError::TransactionExhausted { attempts: 1 });
            }
            self.inner.voter(key).await
        }

        async fn voter_by_token(
            &self,
            digest: &TokenDigest,
        ) -> Result<Option<VoterRecord>, StoreError> {
            self.inner.voter_by_token(digest).await
        }

        async fn token_digests(&self) -> Result<HashSet<TokenDigest>, StoreError> {
            self.inner.token_digests().await
        }

        async fn assign_token(
            &self,
            key: &VoterKey,
            digest: &TokenDigest,
        ) -> Result<bool, StoreError> {
            self.inner.assign_token(key, digest).await
        }

        async fn turnout(&self) -> Result<crate::store::Turnout, StoreError> {
            self.inner.turnout().await
        }
    }

    #[rocket::async_test]
    async fn store_errors_fail_one_voter() {
        let store = MemoryStore::default();
        let broken = VoterRecord::example();
        let healthy = VoterRecord::example_offline();
        store.insert_voter(broken.clone()).await;
        store.insert_voter(healthy.clone()).await;
        let registry = FlakyRegistry {
            inner: store.clone(),
            broken: broken.key.clone(),
        };

        let hasher = TokenHasher::example();
        let issuer = TokenIssuer::new(&hasher, TokenPolicy::default());
        let keys = [broken.key.clone(), healthy.key.clone()];
        let report = issue_batch(&registry, &issuer, &keys).await.unwrap();

        assert_eq!(report.issued.len(), 1);
        assert_eq!(report.issued[0].voter, healthy.key);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].voter, broken.key);
        assert_eq!(report.failed[0].reason, IssuanceFailure::StoreError);
        assert!(store.voter(&broken.key).await.unwrap().unwrap().token_hash.is_none());
    }
}
