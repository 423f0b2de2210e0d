use chrono::Utc;
use log::info;
use rocket::{
    http::Status,
    serde::json::{self, Json},
    Route, State,
};

use crate::error::{Error, Result};
use crate::logging::RequestId;
use crate::model::{
    api::vote::{BallotSpec, VoteReceipt, VoteStatus},
    auth::{AuthToken, Capability},
    common::election::ElectionId,
};
use crate::store::MongoStore;
use crate::voting::VotingService;

pub fn routes() -> Vec<Route> {
    routes![cast_vote, my_vote]
}

/// Cast the caller's vote. Every attempt is audited, including those
/// without a valid token and those from roles that may not vote.
///
/// The caller's identity is checked before the ballot is parsed, so a
/// malformed body does not hide an unauthorised attempt from the audit log.
#[post("/elections/<election_id>/votes", data = "<ballot>")]
pub async fn cast_vote(
    token: Option<AuthToken>,
    election_id: ElectionId,
    ballot: std::result::Result<Json<BallotSpec>, json::Error<'_>>,
    voting: &State<VotingService<MongoStore>>,
    request_id: &RequestId,
) -> Result<(Status, Json<VoteReceipt>)> {
    let now = Utc::now();

    let token = match token {
        Some(token) => token,
        None => {
            voting.reject_unauthenticated(election_id, now).await?;
            return Err(Error::Unauthorized(
                "a valid bearer token is required to vote".to_string(),
            ));
        }
    };
    if !token.permits(Capability::CastVote) {
        voting
            .reject_not_permitted(token.id(), token.role(), election_id, now)
            .await?;
        return Err(Error::Forbidden(format!("role {} may not vote", token.role())));
    }
    let ballot = ballot.map_err(|e| Error::BadRequest(format!("invalid ballot: {e}")))?;

    let cast = voting
        .cast_vote(election_id, token.id(), ballot.candidate_id, now)
        .await
        .map_err(|e| {
            info!("req{request_id} vote rejected ({}): {e}", e.kind());
            e
        })?;
    info!(
        "req{request_id} vote {} cast in election {election_id}",
        cast.vote.id
    );
    Ok((Status::Created, Json(cast.into())))
}

/// Has the caller voted in this election?
#[get("/elections/<election_id>/votes/mine")]
pub async fn my_vote(
    token: AuthToken,
    election_id: ElectionId,
    voting: &State<VotingService<MongoStore>>,
) -> Result<Json<VoteStatus>> {
    token.require(Capability::CastVote)?;
    let has_voted = voting.has_voted(election_id, token.id()).await?;
    Ok(Json(VoteStatus {
        election_id,
        has_voted,
    }))
}
