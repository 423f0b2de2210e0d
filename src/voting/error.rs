use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    common::{
        audit::RejectionReason,
        election::{CandidateId, ElectionId, ElectionStatus},
    },
    mongodb::Id,
};
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, VotingError>;

/// Every way a voting operation can fail.
///
/// Each variant maps to a stable [`kind`](VotingError::kind) string that
/// callers can match on. Storage failures are classified here and never
/// surface as raw driver errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VotingError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("election {election_id} not active at {at}")]
    ElectionNotActive {
        election_id: ElectionId,
        status: ElectionStatus,
        at: DateTime<Utc>,
    },
    #[error("candidate {candidate_id} does not belong to election {election_id}")]
    InvalidCandidate {
        candidate_id: CandidateId,
        election_id: ElectionId,
    },
    #[error("voter {voter_id} already voted in election {election_id}")]
    AlreadyVoted {
        voter_id: Id,
        election_id: ElectionId,
    },
    #[error("election {election_id} has already started")]
    ElectionStarted { election_id: ElectionId },
    #[error("invalid request: {0}")]
    InvalidSpec(String),
    #[error("already exists: {0}")]
    Duplicate(String),
    #[error("audit log write failed: {0}")]
    AuditWriteFailed(String),
    #[error("storage operation timed out")]
    InfrastructureTimeout,
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl VotingError {
    /// Stable identifier of the failure, for clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::ElectionNotActive { .. } => "ElectionNotActive",
            Self::InvalidCandidate { .. } => "InvalidCandidate",
            Self::AlreadyVoted { .. } => "AlreadyVoted",
            Self::ElectionStarted { .. } => "ElectionStarted",
            Self::InvalidSpec(_) => "InvalidSpec",
            Self::Duplicate(_) => "Duplicate",
            Self::AuditWriteFailed(_) => "AuditWriteFailed",
            Self::InfrastructureTimeout => "InfrastructureTimeout",
            Self::StorageUnavailable(_) => "StorageUnavailable",
            Self::Internal(_) => "Internal",
        }
    }

    /// Is the whole operation safe and worthwhile to retry?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InfrastructureTimeout | Self::StorageUnavailable(_)
        )
    }

    /// The reason recorded in the audit log when this error rejects a vote attempt.
    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            Self::NotFound(_) => Some(RejectionReason::UnknownElectionOrCandidate),
            Self::ElectionNotActive { .. } => Some(RejectionReason::ElectionNotActive),
            Self::InvalidCandidate { .. } => Some(RejectionReason::InvalidCandidate),
            Self::AlreadyVoted { .. } => Some(RejectionReason::AlreadyVoted),
            _ => None,
        }
    }
}

impl From<StoreError> for VotingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => Self::InfrastructureTimeout,
            StoreError::Unavailable(msg) => Self::StorageUnavailable(msg),
            StoreError::Duplicate(what) => Self::Duplicate(what),
            StoreError::AuditWrite(msg) => Self::AuditWriteFailed(msg),
            StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}
