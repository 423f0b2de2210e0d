use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Coll;
use crate::store::{StoreError, StoreResult};

/// The counter from which election IDs are allocated.
pub const ELECTION_ID_COUNTER_ID: &str = "election_id";
/// The counter from which candidate IDs are allocated.
pub const CANDIDATE_ID_COUNTER_ID: &str = "candidate_id";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u32,
}

impl Counter {
    /// Atomically retrieve the next value of the counter with the given ID.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> StoreResult<u32> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options: FindOneAndUpdateOptions = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?
            .ok_or_else(|| StoreError::Backend(format!("Failed to find counter with ID {id}")))?;
        Ok(counter.next)
    }
}

/// Ensure the global ID counters exist, starting at 1.
///
/// This operation is idempotent and never resets an existing counter.
pub async fn ensure_counters_exist(counters: &Coll<Counter>) -> Result<(), DbError> {
    let upsert = UpdateOptions::builder().upsert(true).build();
    for id in [ELECTION_ID_COUNTER_ID, CANDIDATE_ID_COUNTER_ID] {
        counters
            .update_one(
                doc! { "_id": id },
                doc! { "$setOnInsert": { "next": 1_i64 } },
                upsert.clone(),
            )
            .await?;
    }
    Ok(())
}
