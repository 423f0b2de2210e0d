use std::collections::HashMap;

use crate::model::{
    common::election::{CandidateId, ElectionId, ElectionStatus},
    db::{Candidate, Election},
};

/// Votes received by one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateCount {
    pub candidate: Candidate,
    pub votes: u64,
}

/// Per-candidate vote counts for one election, derived from the vote rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub election: Election,
    pub status: ElectionStatus,
    /// Every candidate in the election, most votes first, ties broken by name.
    pub counts: Vec<CandidateCount>,
    /// Number of vote rows in the election.
    pub total_votes: u64,
}

impl Tally {
    /// Combine the candidate list with raw per-candidate counts.
    /// Candidates with no votes get a count of zero.
    pub fn new(
        election: Election,
        status: ElectionStatus,
        candidates: Vec<Candidate>,
        counts: &HashMap<CandidateId, u64>,
    ) -> Self {
        let total_votes = counts.values().sum();
        let mut counts = candidates
            .into_iter()
            .map(|candidate| CandidateCount {
                votes: counts.get(&candidate.id).copied().unwrap_or(0),
                candidate,
            })
            .collect::<Vec<_>>();
        counts.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then_with(|| a.candidate.name.cmp(&b.candidate.name))
        });
        Self {
            election,
            status,
            counts,
            total_votes,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    /// Votes for the given candidate, if they stand in this election.
    pub fn votes_for(&self, candidate_id: CandidateId) -> Option<u64> {
        self.counts
            .iter()
            .find(|c| c.candidate.id == candidate_id)
            .map(|c| c.votes)
    }

    /// One-line summary, used as the detail of the closing audit entry.
    pub fn summary(&self) -> String {
        let per_candidate = self
            .counts
            .iter()
            .map(|c| format!("{} ({})={}", c.candidate.name, c.candidate.id, c.votes))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "election {} '{}' closed with {} votes: {}",
            self.election.id, self.election.name, self.total_votes, per_candidate
        )
    }
}

/// Turnout of an election compared against the registered voter population.
#[derive(Debug, Clone, PartialEq)]
pub struct Participation {
    pub election_id: ElectionId,
    pub total_voted: u64,
    pub voter_population: u64,
    pub abstentions: u64,
    /// Percentage of the population that voted, to two decimal places.
    pub turnout_percent: f64,
}

impl Participation {
    pub fn new(election_id: ElectionId, total_voted: u64, voter_population: u64) -> Self {
        let turnout_percent = if voter_population == 0 {
            0.0
        } else {
            let ratio = total_voted as f64 * 100.0 / voter_population as f64;
            (ratio * 100.0).round() / 100.0
        };
        Self {
            election_id,
            total_voted,
            voter_population,
            abstentions: voter_population.saturating_sub(total_voted),
            turnout_percent,
        }
    }
}
