use std::collections::BTreeSet;

use log::{error, info};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::cipher::{BallotCipher, CipherConfig};
use crate::kdf::Argon2Params;
use crate::model::{api::auth::Rights, common::Contests, mongodb::ensure_indexes_exist};
use crate::store::{MongoStore, Store};
use crate::token::{TokenError, TokenHasher, TokenPolicy};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    contests: Contests,
    #[serde(default)]
    tokens: TokenPolicy,
    #[serde(default)]
    token_hashing: Argon2Params,
    #[serde(default)]
    ballot_kdf: Argon2Params,
    // secrets
    ballot_secret: String,
    ballot_salt: String,
    token_pepper: String,
    submitter_key: String,
    reader_key: String,
    registrar_key: String,
}

impl Config {
    /// The contested positions and their candidates.
    pub fn contests(&self) -> &Contests {
        &self.contests
    }

    /// What newly issued tokens look like.
    pub fn token_policy(&self) -> TokenPolicy {
        self.tokens
    }

    /// Cost parameters of the ballot key derivation.
    pub fn ballot_kdf(&self) -> Argon2Params {
        self.ballot_kdf
    }

    /// Everything needed to derive the ballot key.
    pub fn cipher_config(&self) -> CipherConfig {
        CipherConfig {
            secret: self.ballot_secret.clone(),
            salt: self.ballot_salt.clone(),
            kdf: self.ballot_kdf,
        }
    }

    /// Build the token hasher from the configured pepper.
    pub fn token_hasher(&self) -> Result<TokenHasher, TokenError> {
        TokenHasher::new(self.token_pepper.as_bytes(), self.token_hashing)
    }

    /// The API key that grants the given rights.
    pub fn api_key(&self, rights: Rights) -> &str {
        match rights {
            Rights::Submitter => &self.submitter_key,
            Rights::Reader => &self.reader_key,
            Rights::Registrar => &self.registrar_key,
        }
    }

    /// Reject configurations that could not run an election.
    pub fn validate(&self) -> Result<(), String> {
        if self.contests.is_empty() {
            return Err("no contests configured".to_string());
        }
        for (position, candidates) in &self.contests {
            if candidates.is_empty() {
                return Err(format!("contest '{position}' has no candidates"));
            }
            let unique: BTreeSet<_> = candidates.iter().collect();
            if unique.len() != candidates.len() {
                return Err(format!("contest '{position}' lists a candidate twice"));
            }
        }
        if self.tokens.length == 0 {
            return Err("token length must be positive".to_string());
        }
        let all_rights = [Rights::Submitter, Rights::Reader, Rights::Registrar];
        for (i, rights) in all_rights.iter().enumerate() {
            let key = self.api_key(*rights);
            if key.is_empty() {
                return Err(format!("no API key configured for {rights}"));
            }
            if let Some(other) = all_rights[..i]
                .iter()
                .find(|other| self.api_key(**other) == key)
            {
                return Err(format!("{other} and {rights} share an API key"));
            }
        }
        Ok(())
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if let Err(e) = config.validate() {
            error!("Invalid application config: {e}");
            return Err(rocket);
        }
        info!("Loaded config for {} contest(s)", config.contests.len());

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// A fairing that derives the ballot key and builds the token hasher,
/// once, and places both into managed state. Must be attached after
/// [`ConfigFairing`].
pub struct CryptoFairing;

#[rocket::async_trait]
impl Fairing for CryptoFairing {
    fn info(&self) -> Info {
        Info {
            name: "Crypto",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = rocket.state::<Config>() else {
            error!("Application config must be loaded before deriving keys");
            return Err(rocket);
        };

        let cipher = match BallotCipher::new(&config.cipher_config()) {
            Ok(cipher) => cipher,
            Err(e) => {
                error!("Failed to set up ballot encryption: {e}");
                return Err(rocket);
            }
        };
        let hasher = match config.token_hasher() {
            Ok(hasher) => hasher,
            Err(e) => {
                error!("Failed to set up token hashing: {e}");
                return Err(rocket);
            }
        };
        info!("Derived ballot key and token hasher");

        // Manage the state.
        rocket = rocket.manage(cipher).manage(hasher);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
}

fn default_db_name() -> String {
    "anonvote".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places the storage backend into
/// managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&config.db_name);

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(Store::new(MongoStore::new(client, db)));
        Ok(rocket)
    }
}

/// Example data for tests.
#[cfg(test)]
pub mod examples {
    use super::*;
    use crate::model::common::examples::contests;

    impl Config {
        pub fn example() -> Self {
            Self {
                contests: contests(),
                tokens: TokenPolicy::default(),
                token_hashing: Argon2Params::example(),
                ballot_kdf: Argon2Params::example(),
                ballot_secret: "correct horse battery staple".to_string(),
                ballot_salt: "ballot-box-test-salt".to_string(),
                token_pepper: "test-pepper-value".to_string(),
                submitter_key: "submitter-key".to_string(),
                reader_key: "reader-key".to_string(),
                registrar_key: "registrar-key".to_string(),
            }
        }
    }
}
