#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, CryptoFairing, DatabaseFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod cast;
pub mod cipher;
pub mod config;
pub mod error;
pub mod kdf;
pub mod logging;
pub mod model;
pub mod retry;
pub mod store;
pub mod tally;
pub mod token;

/// Build the server. Configuration is loaded, keys are derived and the
/// database is connected to when the returned rocket is ignited.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(CryptoFairing)
        .attach(DatabaseFairing)
        .attach(LoggerFairing)
}

/// A rocket backed by `store`, with example config and keys.
#[cfg(test)]
pub(crate) fn rocket_for_store(store: store::MemoryStore) -> Rocket<Build> {
    let config = config::Config::example();
    let cipher = cipher::BallotCipher::new(&config.cipher_config()).unwrap();
    let hasher = config.token_hasher().unwrap();
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .manage(store::Store::new(store))
        .manage(cipher)
        .manage(hasher)
        .manage(config)
}

/// A MongoDB store in a fresh, uniquely named database. Connects to
/// `MONGO_URI`, which must point at a replica set for transactions to work.
#[cfg(test)]
pub(crate) async fn test_mongo_store() -> store::MongoStore {
    use rand::{distributions::Alphanumeric, Rng};

    let uri = std::env::var("MONGO_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string());
    let client = mongodb::Client::with_uri_str(uri).await.unwrap();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let db = client.database(&format!("anonvote-test-{suffix}"));
    model::mongodb::ensure_indexes_exist(&db).await.unwrap();
    store::MongoStore::new(client, db)
}
