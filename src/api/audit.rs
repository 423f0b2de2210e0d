use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::audit::{AuditEntryDesc, AuditQuery},
    auth::{AuthToken, Capability},
    pagination::{Paginated, Pagination},
};
use crate::store::MongoStore;
use crate::voting::VotingService;

pub fn routes() -> Vec<Route> {
    routes![audit_trail]
}

/// The audit trail in history order, optionally filtered by action, user,
/// election and an inclusive date range. Paged with `page_num` and `page_size`.
#[get("/audit?<action>&<user>&<election>&<from>&<to>")]
pub async fn audit_trail(
    token: AuthToken,
    action: Option<&str>,
    user: Option<&str>,
    election: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    pagination: Pagination,
    voting: &State<VotingService<MongoStore>>,
) -> Result<Json<Paginated<AuditEntryDesc>>> {
    token.require(Capability::ViewAuditTrail)?;
    let filter = AuditQuery {
        action,
        user,
        election,
        from,
        to,
    }
    .into_filter()?;

    let (entries, total) = voting
        .audit_trail(&filter, pagination.skip(), pagination.page_size())
        .await?;
    Ok(Json(Paginated {
        items: entries.into_iter().map(AuditEntryDesc::from).collect(),
        pagination: pagination.result(total),
    }))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rocket::http::{Header, Status};
    use rocket::local::asynchronous::Client;

    use super::*;
    use crate::model::{
        common::audit::AuditAction,
        db::AuditEntry,
        mongodb::{Coll, Id},
    };

    #[backend_test(auditor)]
    async fn filters_and_pages(client: Client, header: Header<'static>, audit_log: Coll<AuditEntry>) {
        let user = Id::new();
        let base = Utc::now() - Duration::hours(1);
        let entries = (0..5)
            .map(|i| {
                let action = if i % 2 == 0 {
                    AuditAction::VoteAttempt
                } else {
                    AuditAction::LoginSuccess
                };
                AuditEntry::new(Some(user), action, format!("entry {i}"), base + Duration::minutes(i))
            })
            .collect::<Vec<_>>();
        audit_log.insert_many(entries, None).await.unwrap();

        let response = client
            .get(format!(
                "/audit?action=VoteAttempt&user={user}&page_num=1&page_size=2"
            ))
            .header(header.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let page: Paginated<AuditEntryDesc> = response.into_json().await.unwrap();
        assert_eq!(page.pagination.total, 3);
        let details = page.items.iter().map(|e| e.detail.as_str()).collect::<Vec<_>>();
        assert_eq!(details, vec!["entry 0", "entry 2"]);

        let response = client
            .get("/audit?action=Teleport")
            .header(header)
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(voter)]
    async fn voters_cannot_read_audit_trail(client: Client, header: Header<'static>) {
        let response = client.get("/audit").header(header).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
    }
}
