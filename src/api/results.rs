use chrono::{DateTime, Utc};
use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::results::{ElectionResults, ParticipationReport},
    auth::{AuthToken, Capability},
    common::election::{ElectionId, ElectionStatus},
};
use crate::store::MongoStore;
use crate::voting::VotingService;

pub fn routes() -> Vec<Route> {
    routes![results, participation]
}

/// Results of an active election are live; only roles with `ViewLiveResults` may see them.
fn check_visibility(token: &AuthToken, status: ElectionStatus) -> Result<()> {
    token.require(Capability::ViewResults)?;
    if !status.is_closed() {
        token.require(Capability::ViewLiveResults)?;
    }
    Ok(())
}

/// Authorise the caller against the election's status before anything is counted.
async fn authorise(
    token: &AuthToken,
    election_id: ElectionId,
    voting: &VotingService<MongoStore>,
    now: DateTime<Utc>,
) -> Result<()> {
    let overview = voting.describe_election(election_id, now).await?;
    check_visibility(token, overview.status)
}

#[get("/elections/<election_id>/results")]
pub async fn results(
    token: AuthToken,
    election_id: ElectionId,
    voting: &State<VotingService<MongoStore>>,
) -> Result<Json<ElectionResults>> {
    let now = Utc::now();
    authorise(&token, election_id, voting, now).await?;
    let tally = voting.results(election_id, now).await?;
    Ok(Json(tally.into()))
}

#[get("/elections/<election_id>/participation")]
pub async fn participation(
    token: AuthToken,
    election_id: ElectionId,
    voting: &State<VotingService<MongoStore>>,
) -> Result<Json<ParticipationReport>> {
    let now = Utc::now();
    authorise(&token, election_id, voting, now).await?;
    let report = voting.participation(election_id, now).await?;
    Ok(Json(report.into()))
}

#[cfg(test)]
mod tests {
    use rocket::http::{Header, Status};
    use rocket::local::asynchronous::Client;

    use super::*;
    use crate::error::{Error, ErrorBody};
    use crate::model::{
        auth::Role,
        db::{Candidate, Election, Vote},
        mongodb::{Coll, Id},
    };

    #[test]
    fn live_results_need_privilege() {
        let voter = AuthToken::new(Id::new(), Role::Voter);
        let auditor = AuthToken::new(Id::new(), Role::Auditor);

        assert!(check_visibility(&voter, ElectionStatus::Closed).is_ok());
        assert!(matches!(
            check_visibility(&voter, ElectionStatus::Active),
            Err(Error::Forbidden(_))
        ));
        assert!(check_visibility(&auditor, ElectionStatus::Active).is_ok());
    }

    async fn insert_votes(
        elections: &Coll<Election>,
        candidates: &Coll<Candidate>,
        votes: &Coll<Vote>,
    ) {
        let now = Utc::now();
        elections
            .insert_many(
                [
                    Election::active_example(1, now),
                    Election::closed_example(2, now),
                ],
                None,
            )
            .await
            .unwrap();
        candidates
            .insert_many(
                [
                    Candidate::example(1, 1, "Alice"),
                    Candidate::example(2, 2, "Bob"),
                    Candidate::example(3, 2, "Carol"),
                ],
                None,
            )
            .await
            .unwrap();
        let cast_at = now - chrono::Duration::days(1) - chrono::Duration::hours(1);
        votes
            .insert_many(
                [
                    Vote::new(1, Id::new(), 1, now),
                    Vote::new(2, Id::new(), 3, cast_at),
                    Vote::new(2, Id::new(), 3, cast_at),
                    Vote::new(2, Id::new(), 2, cast_at),
                ],
                None,
            )
            .await
            .unwrap();
    }

    #[backend_test(voter)]
    async fn voters_see_closed_results(
        client: Client,
        header: Header<'static>,
        elections: Coll<Election>,
        candidates: Coll<Candidate>,
        votes: Coll<Vote>,
    ) {
        insert_votes(&elections, &candidates, &votes).await;

        let response = client
            .get(uri!(results(2)))
            .header(header.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let published: ElectionResults = response.into_json().await.unwrap();
        assert!(published.is_closed);
        assert_eq!(published.total_votes, 3);
        assert_eq!(published.total_candidates, 2);
        assert_eq!(published.items[0].name, "Carol");
        assert_eq!(published.items[0].votes, 2);

        let response = client
            .get(uri!(results(1)))
            .header(header)
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        let body: ErrorBody = response.into_json().await.unwrap();
        assert_eq!(body.kind, "Forbidden");
    }

    #[backend_test(auditor)]
    async fn auditors_see_live_results(
        client: Client,
        header: Header<'static>,
        elections: Coll<Election>,
        candidates: Coll<Candidate>,
        votes: Coll<Vote>,
    ) {
        insert_votes(&elections, &candidates, &votes).await;

        let response = client
            .get(uri!(results(1)))
            .header(header.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let live: ElectionResults = response.into_json().await.unwrap();
        assert!(!live.is_closed);
        assert_eq!(live.total_votes, 1);

        let response = client
            .get(uri!(participation(2)))
            .header(header)
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let report: ParticipationReport = response.into_json().await.unwrap();
        assert_eq!(report.total_voted, 3);
    }

    #[backend_test(voter)]
    async fn voters_cannot_ask_about_scheduled_elections(
        client: Client,
        header: Header<'static>,
        elections: Coll<Election>,
    ) {
        elections
            .insert_one(Election::scheduled_example(3, Utc::now()), None)
            .await
            .unwrap();

        for uri in [uri!(results(3)), uri!(participation(3))] {
            let response = client.get(uri).header(header.clone()).dispatch().await;
            assert_eq!(Status::Forbidden, response.status());
            let body: ErrorBody = response.into_json().await.unwrap();
            assert_eq!(body.kind, "Forbidden");
        }

        let response = client.get(uri!(results(9))).header(header).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }
}
