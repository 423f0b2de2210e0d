use std::fmt::{Display, Formatter};
use std::str::FromStr;

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// The closed vocabulary of audited actions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    /// A vote was committed.
    VoteCast,
    /// A vote attempt was rejected.
    VoteAttempt,
    LoginSuccess,
    LoginFailed,
    Logout,
    ElectionCreated,
    CandidateAdded,
    /// An election's window ended; the detail carries the final tally.
    ElectionClosed,
}

impl AuditAction {
    pub const ALL: [AuditAction; 8] = [
        Self::VoteCast,
        Self::VoteAttempt,
        Self::LoginSuccess,
        Self::LoginFailed,
        Self::Logout,
        Self::ElectionCreated,
        Self::CandidateAdded,
        Self::ElectionClosed,
    ];
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Case-insensitive match on the action name.
impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|action| action.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown audit action '{s}'"))
    }
}

impl From<AuditAction> for Bson {
    fn from(action: AuditAction) -> Self {
        Bson::String(action.to_string())
    }
}

/// Why a vote attempt was rejected, stored alongside `VoteAttempt` entries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    Unauthenticated,
    NotPermitted,
    UnknownElectionOrCandidate,
    ElectionNotActive,
    InvalidCandidate,
    AlreadyVoted,
}

impl From<RejectionReason> for Bson {
    fn from(reason: RejectionReason) -> Self {
        Bson::String(format!("{reason:?}"))
    }
}
