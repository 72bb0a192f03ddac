use rocket::{serde::json::Json, Route, State};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::api::{
    auth::{ApiKey, Registrar},
    token::IssueRequest,
};
use crate::store::Store;
use crate::token::{issue_batch, IssuanceReport, TokenHasher, TokenIssuer};

pub fn routes() -> Vec<Route> {
    routes![issue_tokens]
}

#[post("/tokens", data = "<request>", format = "json")]
async fn issue_tokens(
    _key: ApiKey<Registrar>,
    request: Json<IssueRequest>,
    config: &State<Config>,
    hasher: &State<TokenHasher>,
    store: Store,
) -> Result<Json<IssuanceReport>> {
    if request.voters.is_empty() {
        return Err(Error::bad_request("no voters given"));
    }

    let issuer = TokenIssuer::new(hasher.inner(), config.token_policy());
    let report = issue_batch(&*store, &issuer, &request.voters).await?;
    Ok(Json(report))
}
