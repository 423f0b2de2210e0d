use chrono::Utc;
use rocket::{http::Status, serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::election::{CandidateDesc, CandidateSpec, ElectionDescription, ElectionSpec},
    auth::{AuthToken, Capability},
    common::election::ElectionId,
};
use crate::store::MongoStore;
use crate::voting::{ElectionClosers, ElectionOverview, VotingService};

pub fn routes() -> Vec<Route> {
    routes![election, create_election, add_candidate]
}

#[get("/elections/<election_id>")]
pub async fn election(
    _token: AuthToken,
    election_id: ElectionId,
    voting: &State<VotingService<MongoStore>>,
) -> Result<Json<ElectionDescription>> {
    let overview = voting.describe_election(election_id, Utc::now()).await?;
    Ok(Json(overview.into()))
}

#[post("/elections", data = "<spec>", format = "json")]
pub async fn create_election(
    token: AuthToken,
    spec: Json<ElectionSpec>,
    voting: &State<VotingService<MongoStore>>,
    closers: &State<ElectionClosers<MongoStore>>,
) -> Result<(Status, Json<ElectionDescription>)> {
    token.require(Capability::ManageElections)?;
    let now = Utc::now();
    let spec = spec.into_inner();

    let election = voting
        .create_election(token.id(), spec.name, spec.start_time, spec.end_time, now)
        .await?;
    closers.schedule_election(&election).await;

    let overview = ElectionOverview {
        status: election.status(now),
        election,
        candidates: Vec::new(),
    };
    Ok((Status::Created, Json(overview.into())))
}

#[post("/elections/<election_id>/candidates", data = "<spec>", format = "json")]
pub async fn add_candidate(
    token: AuthToken,
    election_id: ElectionId,
    spec: Json<CandidateSpec>,
    voting: &State<VotingService<MongoStore>>,
) -> Result<(Status, Json<CandidateDesc>)> {
    token.require(Capability::ManageElections)?;
    let spec = spec.into_inner();

    let candidate = voting
        .add_candidate(token.id(), election_id, spec.name, spec.party, Utc::now())
        .await?;
    Ok((Status::Created, Json(candidate.into())))
}

#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Header};
    use rocket::local::asynchronous::Client;
    use rocket::serde::json::serde_json;

    use super::*;
    use crate::error::ErrorBody;
    use crate::model::common::election::ElectionStatus;

    #[backend_test(admin)]
    async fn create_and_describe(client: Client, header: Header<'static>) {
        let response = client
            .post(uri!(create_election))
            .header(header.clone())
            .header(ContentType::JSON)
            .body(serde_json::json!(ElectionSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        let created: ElectionDescription = response.into_json().await.unwrap();
        assert_eq!(created.status, ElectionStatus::Scheduled);

        // Closers are scheduled for new elections.
        let closers = client
            .rocket()
            .state::<ElectionClosers<MongoStore>>()
            .unwrap();
        assert!(closers.has_closer(created.id).await);

        for name in ["Alice", "Bob"] {
            let response = client
                .post(uri!(add_candidate(created.id)))
                .header(header.clone())
                .header(ContentType::JSON)
                .body(serde_json::json!(CandidateSpec::example(name)).to_string())
                .dispatch()
                .await;
            assert_eq!(Status::Created, response.status());
        }

        let response = client
            .post(uri!(add_candidate(created.id)))
            .header(header.clone())
            .header(ContentType::JSON)
            .body(serde_json::json!(CandidateSpec::example("Alice")).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
        let body: ErrorBody = response.into_json().await.unwrap();
        assert_eq!(body.kind, "Duplicate");

        let response = client
            .get(uri!(election(created.id)))
            .header(header)
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let described: ElectionDescription = response.into_json().await.unwrap();
        let names = described
            .candidates
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[backend_test(admin)]
    async fn invalid_window_is_rejected(client: Client, header: Header<'static>) {
        let mut spec = ElectionSpec::example();
        std::mem::swap(&mut spec.start_time, &mut spec.end_time);

        let response = client
            .post(uri!(create_election))
            .header(header)
            .header(ContentType::JSON)
            .body(serde_json::json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
    }

    #[backend_test(voter)]
    async fn voters_cannot_create_elections(client: Client, header: Header<'static>) {
        let response = client
            .post(uri!(create_election))
            .header(header)
            .header(ContentType::JSON)
            .body(serde_json::json!(ElectionSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }
}
