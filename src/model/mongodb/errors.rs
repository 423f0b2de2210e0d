//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps.

use std::io::ErrorKind as IoErrorKind;

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY: i32 = 11000;

pub const TRANSIENT_TRANSACTION_ERROR: &str = "TransientTransactionError";
pub const UNKNOWN_TRANSACTION_COMMIT_RESULT: &str = "UnknownTransactionCommitResult";

/// Return true if the given error is a duplicate key write error.
///
/// Inside a transaction the violation may surface as a command error rather
/// than a write error, so both are checked.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(ref e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Return true if the error is worth retrying the whole transaction for.
pub fn is_transient_transaction_error(err: &DbError) -> bool {
    err.contains_label(TRANSIENT_TRANSACTION_ERROR)
}

/// Return true if a commit may or may not have applied and should be retried.
pub fn is_unknown_commit_result(err: &DbError) -> bool {
    err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
}

/// Return true if the error means the driver gave up waiting.
pub fn is_timeout(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Io(ref e) => e.kind() == IoErrorKind::TimedOut,
        _ => false,
    }
}

/// Return true if no suitable server could be reached.
pub fn is_unavailable(err: &DbError) -> bool {
    matches!(*err.kind, ErrorKind::ServerSelection { .. } | ErrorKind::Io(_))
}
