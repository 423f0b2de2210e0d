use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        audit::{AuditAction, RejectionReason},
        election::ElectionId,
    },
    mongodb::Id,
};

/// An immutable audit log record.
///
/// The storage layer only appends and reads entries; it has no update or delete.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(rename = "_id")]
    pub id: Id,
    /// The acting user, or `None` for anonymous or system actions.
    pub user_id: Option<Id>,
    pub action: AuditAction,
    /// The election the action concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_id: Option<ElectionId>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    pub detail: String,
    /// Set on `VoteAttempt` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
}

impl AuditEntry {
    /// A new entry with a fresh ID.
    pub fn new(
        user_id: Option<Id>,
        action: AuditAction,
        detail: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Id::new(),
            user_id,
            action,
            election_id: None,
            timestamp,
            detail: detail.into(),
            reason: None,
        }
    }

    /// Tag the entry with the election it concerns.
    pub fn for_election(self, election_id: ElectionId) -> Self {
        Self {
            election_id: Some(election_id),
            ..self
        }
    }

    /// A `VoteAttempt` entry recording why the attempt was rejected.
    pub fn rejection(
        user_id: Option<Id>,
        reason: RejectionReason,
        detail: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            reason: Some(reason),
            ..Self::new(user_id, AuditAction::VoteAttempt, detail, timestamp)
        }
    }
}
