use mongodb::error::Error as DbError;
use thiserror::Error;

use crate::model::mongodb::{is_timeout, is_unavailable};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage operation timed out")]
    Timeout,

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("audit write failed: {0}")]
    AuditWrite(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if is_timeout(&err) {
            Self::Timeout
        } else if is_unavailable(&err) {
            Self::Unavailable(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}

impl From<mongodb::bson::de::Error> for StoreError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        Self::Backend(format!("malformed document: {err}"))
    }
}
