use jsonwebtoken::errors::Error as JwtError;
use log::{error, warn};
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;
use crate::voting::VotingError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token: {0}")]
    Jwt(#[from] JwtError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Voting(#[from] VotingError),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::Voting(err.into())
    }
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Self::Jwt(_) | Self::Unauthorized(_) => Status::Unauthorized,
            Self::BadRequest(_) => Status::BadRequest,
            Self::Forbidden(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::Internal(_) => Status::InternalServerError,
            Self::Voting(err) => match err {
                VotingError::NotFound(_) => Status::NotFound,
                VotingError::ElectionNotActive { .. }
                | VotingError::AlreadyVoted { .. }
                | VotingError::ElectionStarted { .. }
                | VotingError::Duplicate(_) => Status::Conflict,
                VotingError::InvalidCandidate { .. } | VotingError::InvalidSpec(_) => {
                    Status::UnprocessableEntity
                }
                VotingError::StorageUnavailable(_) => Status::ServiceUnavailable,
                VotingError::InfrastructureTimeout => Status::GatewayTimeout,
                VotingError::AuditWriteFailed(_) | VotingError::Internal(_) => {
                    Status::InternalServerError
                }
            },
        }
    }

    /// Stable identifier of the failure, for clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Jwt(_) => "InvalidToken",
            Self::BadRequest(_) => "BadRequest",
            Self::Unauthorized(_) => "Unauthenticated",
            Self::Forbidden(_) => "Forbidden",
            Self::NotFound(_) => "NotFound",
            Self::Internal(_) => "Internal",
            Self::Voting(err) => err.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Voting(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{} {}: {self}", req.method(), req.uri());
        } else {
            warn!("{} {}: {self}", req.method(), req.uri());
        }
        (status, Json(self.body())).respond_to(req)
    }
}

/// Render errors raised before a handler runs (e.g. by request guards) in the same shape.
#[catch(default)]
pub fn default_catcher(status: Status, _req: &Request<'_>) -> (Status, Json<ErrorBody>) {
    let body = ErrorBody {
        kind: status.reason().unwrap_or("Unknown").replace(' ', ""),
        message: status.to_string(),
        retryable: status == Status::ServiceUnavailable || status == Status::GatewayTimeout,
    };
    (status, Json(body))
}
