use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::election::{CandidateId, ElectionId},
};
use crate::voting::CastVote;

/// The candidate a voter wishes to vote for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotSpec {
    pub candidate_id: CandidateId,
}

/// Proof of a committed vote, returned to the voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub vote_id: ApiId,
    pub election_id: ElectionId,
    pub election_name: String,
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub voted_at: DateTime<Utc>,
}

impl From<CastVote> for VoteReceipt {
    fn from(cast: CastVote) -> Self {
        Self {
            vote_id: cast.vote.id.into(),
            election_id: cast.election.id,
            election_name: cast.election.name,
            candidate_id: cast.candidate.id,
            candidate_name: cast.candidate.name,
            voted_at: cast.vote.cast_at,
        }
    }
}

/// Whether the caller has voted in an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStatus {
    pub election_id: ElectionId,
    pub has_voted: bool,
}
