use rocket::{serde::json::Json, Route, State};

use crate::cipher::BallotCipher;
use crate::config::Config;
use crate::error::Result;
use crate::model::api::{
    auth::{ApiKey, Reader},
    ballot::BallotDump,
    results::ResultsReport,
};
use crate::store::Store;
use crate::tally::tally_store;

pub fn routes() -> Vec<Route> {
    routes![results, ballots]
}

#[get("/results")]
async fn results(
    _key: ApiKey<Reader>,
    config: &State<Config>,
    cipher: &State<BallotCipher>,
    store: Store,
) -> Result<Json<ResultsReport>> {
    let report = tally_store(&*store, cipher.inner(), config.contests()).await?;
    let turnout = store.turnout().await?;
    Ok(Json(ResultsReport::new(report, turnout)))
}

/// Export the encrypted ballot box for offline re-tallying.
#[get("/ballots")]
async fn ballots(
    _key: ApiKey<Reader>,
    config: &State<Config>,
    store: Store,
) -> Result<Json<BallotDump>> {
    let ballots = store.list_all().await?;
    Ok(Json(BallotDump {
        contests: config.contests().clone(),
        kdf: config.ballot_kdf(),
        ballots: ballots.into_iter().map(Into::into).collect(),
    }))
}
