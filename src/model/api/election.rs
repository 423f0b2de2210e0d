use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{CandidateId, ElectionId, ElectionStatus},
    db::Candidate,
};
use crate::voting::ElectionOverview;

/// An election to create. Either instant may be left out until the election is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub name: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// A candidate to add to an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    #[serde(default)]
    pub party: String,
}

/// A candidate, as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDesc {
    pub id: CandidateId,
    pub name: String,
    pub party: String,
}

impl From<Candidate> for CandidateDesc {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.name,
            party: candidate.party,
        }
    }
}

/// An election with its current status and candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: ElectionId,
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ElectionStatus,
    pub candidates: Vec<CandidateDesc>,
}

impl From<ElectionOverview> for ElectionDescription {
    fn from(overview: ElectionOverview) -> Self {
        Self {
            id: overview.election.id,
            name: overview.election.name,
            start_time: overview.election.start_time,
            end_time: overview.election.end_time,
            status: overview.status,
            candidates: overview
                .candidates
                .into_iter()
                .map(CandidateDesc::from)
                .collect(),
        }
    }
}
