mod bson;
mod collection;
mod counter;
mod errors;

pub use bson::{optional_datetime, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{ensure_counters_exist, Counter, CANDIDATE_ID_COUNTER_ID, ELECTION_ID_COUNTER_ID};
pub use errors::{
    is_duplicate_key_error, is_timeout, is_transient_transaction_error, is_unavailable,
    is_unknown_commit_result,
};
