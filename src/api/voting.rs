use rocket::{serde::json::Json, Route, State};

use crate::cast::{CastOutcome, VoteCaster};
use crate::cipher::BallotCipher;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::{ApiKey, Submitter},
        token::{TokenIdentity, TokenLogin},
        vote::CastRequest,
        voter::VoterStatus,
    },
    common::{Contests, Position, VoteMethod, VoterKey},
};
use crate::store::Store;
use crate::token::TokenHasher;

pub fn routes() -> Vec<Route> {
    routes![contests, voter_status, cast_vote, verify_token]
}

/// The positions on the ballot and their candidates, optionally for a
/// single position.
#[get("/contests?<position>")]
fn contests(
    _key: ApiKey<Submitter>,
    position: Option<String>,
    config: &State<Config>,
) -> Result<Json<Contests>> {
    let all = config.contests();
    match position {
        None => Ok(Json(all.clone())),
        Some(position) => {
            let position = Position::from(position);
            let candidates = all
                .get(&position)
                .ok_or_else(|| Error::not_found(format!("no contest for '{position}'")))?;
            Ok(Json(Contests::from([(position, candidates.clone())])))
        }
    }
}

/// Whether a voter may vote, before they fill in a ballot.
#[get("/voters/<voter>/status")]
async fn voter_status(
    _key: ApiKey<Submitter>,
    voter: String,
    cipher: &State<BallotCipher>,
    hasher: &State<TokenHasher>,
    store: Store,
) -> Result<Json<VoterStatus>> {
    let caster = VoteCaster::new(&*store, cipher.inner(), hasher.inner());
    let record = caster.check_standing(&VoterKey::from(voter)).await?;
    Ok(Json(VoterStatus {
        voter: record.key,
        vote_method: record.vote_method,
        token_required: record.vote_method == Some(VoteMethod::Offline),
    }))
}

#[post("/votes", data = "<request>", format = "json")]
async fn cast_vote(
    _key: ApiKey<Submitter>,
    request: Json<CastRequest>,
    config: &State<Config>,
    cipher: &State<BallotCipher>,
    hasher: &State<TokenHasher>,
    store: Store,
) -> Result<Json<CastOutcome>> {
    // Validate the submission before touching the voter registry.
    let preferences = request
        .preferences(config.contests())
        .map_err(|err| Error::bad_request(err.to_string()))?;

    let caster = VoteCaster::new(&*store, cipher.inner(), hasher.inner());
    let outcome = caster
        .submit(&request.voter, request.token.as_ref(), &preferences)
        .await?;
    Ok(Json(outcome))
}

#[post("/tokens/verify", data = "<login>", format = "json")]
async fn verify_token(
    _key: ApiKey<Submitter>,
    login: Json<TokenLogin>,
    cipher: &State<BallotCipher>,
    hasher: &State<TokenHasher>,
    store: Store,
) -> Result<Json<TokenIdentity>> {
    let caster = VoteCaster::new(&*store, cipher.inner(), hasher.inner());
    let voter = caster.authenticate_token(&login.token).await?;
    Ok(Json(TokenIdentity { voter: voter.key }))
}
