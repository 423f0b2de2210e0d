use serde::{Deserialize, Serialize};

use crate::model::common::election::{CandidateId, ElectionId};

/// A candidate standing in exactly one election.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: CandidateId,
    /// The election this candidate stands in.
    pub election_id: ElectionId,
    /// Candidate name, unique within the election.
    pub name: String,
    /// Party or group label.
    pub party: String,
}

impl Candidate {
    /// Does this candidate stand in the given election?
    pub fn stands_in(&self, election_id: ElectionId) -> bool {
        self.election_id == election_id
    }
}
