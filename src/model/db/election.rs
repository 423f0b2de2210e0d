use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{ElectionId, ElectionStatus},
    mongodb::optional_datetime,
};

/// Election reference data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Election {
    /// Unique ID.
    #[serde(rename = "_id")]
    pub id: ElectionId,
    /// Election name, unique across elections.
    pub name: String,
    /// Opening instant; unset until the election is scheduled.
    #[serde(default, with = "optional_datetime")]
    pub start_time: Option<DateTime<Utc>>,
    /// Closing instant; unset until the election is scheduled.
    #[serde(default, with = "optional_datetime")]
    pub end_time: Option<DateTime<Utc>>,
}

impl Election {
    /// The lifecycle status of this election at instant `now`.
    pub fn status(&self, now: DateTime<Utc>) -> ElectionStatus {
        ElectionStatus::classify(self.start_time, self.end_time, now)
    }
}
