use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    common::{
        audit::{AuditAction, RejectionReason},
        election::ElectionId,
    },
    db::AuditEntry,
    mongodb::Id,
};
use crate::store::AuditFilter;

/// An audit entry, as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntryDesc {
    pub id: ApiId,
    /// The acting user; absent for anonymous and system entries.
    pub user_id: Option<ApiId>,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_id: Option<ElectionId>,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
}

impl From<AuditEntry> for AuditEntryDesc {
    fn from(entry: AuditEntry) -> Self {
        Self {
            id: entry.id.into(),
            user_id: entry.user_id.map(ApiId::from),
            action: entry.action,
            election_id: entry.election_id,
            timestamp: entry.timestamp,
            detail: entry.detail,
            reason: entry.reason,
        }
    }
}

/// Audit trail filters, as raw query values.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuditQuery<'r> {
    pub action: Option<&'r str>,
    pub user: Option<&'r str>,
    pub election: Option<&'r str>,
    pub from: Option<&'r str>,
    pub to: Option<&'r str>,
}

impl AuditQuery<'_> {
    /// Parse the filters, rejecting any value that does not parse rather than ignoring it.
    pub fn into_filter(self) -> Result<AuditFilter> {
        let action = self
            .action
            .map(|action| action.parse::<AuditAction>().map_err(Error::BadRequest))
            .transpose()?;
        let user_id = self
            .user
            .map(|user| {
                user.parse::<Id>()
                    .map_err(|e| Error::BadRequest(format!("invalid user ID '{user}': {e}")))
            })
            .transpose()?;
        let election_id = self
            .election
            .map(|election| {
                election.parse::<ElectionId>().map_err(|e| {
                    Error::BadRequest(format!("invalid election ID '{election}': {e}"))
                })
            })
            .transpose()?;
        let from = self.from.map(parse_timestamp).transpose()?;
        let to = self.to.map(parse_timestamp).transpose()?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(Error::BadRequest(format!(
                    "date range starts at {from}, after its end {to}"
                )));
            }
        }
        Ok(AuditFilter {
            action,
            user_id,
            election_id,
            from,
            to,
        })
    }
}

/// Parse an RFC 3339 instant, e.g. `2024-05-01T09:00:00Z`.
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|datetime| datetime.with_timezone(&Utc))
        .map_err(|e| Error::BadRequest(format!("invalid timestamp '{value}': {e}")))
}
