use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{CandidateId, ElectionId},
    mongodb::Id,
};

/// A cast vote. Votes are written once and never modified.
///
/// The `votes` collection carries a unique index on `(election_id, voter_id)`.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    pub election_id: ElectionId,
    pub voter_id: Id,
    pub candidate_id: CandidateId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    /// A new vote with a fresh ID.
    pub fn new(
        election_id: ElectionId,
        voter_id: Id,
        candidate_id: CandidateId,
        cast_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Id::new(),
            election_id,
            voter_id,
            candidate_id,
            cast_at,
        }
    }
}
