use serde::{Deserialize, Serialize};

use crate::model::common::election::{CandidateId, ElectionId};
use crate::voting::{Participation, Tally};

/// Votes for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub candidate_id: CandidateId,
    pub name: String,
    pub party: String,
    pub votes: u64,
}

/// Results of an election, most votes first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election_id: ElectionId,
    pub election_name: String,
    pub is_closed: bool,
    pub total_votes: u64,
    pub total_candidates: usize,
    pub items: Vec<CandidateResult>,
}

impl From<Tally> for ElectionResults {
    fn from(tally: Tally) -> Self {
        let is_closed = tally.is_closed();
        let items = tally
            .counts
            .into_iter()
            .map(|count| CandidateResult {
                candidate_id: count.candidate.id,
                name: count.candidate.name,
                party: count.candidate.party,
                votes: count.votes,
            })
            .collect::<Vec<_>>();
        Self {
            election_id: tally.election.id,
            election_name: tally.election.name,
            is_closed,
            total_votes: tally.total_votes,
            total_candidates: items.len(),
            items,
        }
    }
}

/// Turnout of an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipationReport {
    pub election_id: ElectionId,
    pub total_voted: u64,
    pub voter_population: u64,
    pub abstentions: u64,
    pub turnout_percent: f64,
}

impl From<Participation> for ParticipationReport {
    fn from(report: Participation) -> Self {
        Self {
            election_id: report.election_id,
            total_voted: report.total_voted,
            voter_population: report.voter_population,
            abstentions: report.abstentions,
            turnout_percent: report.turnout_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;
    use crate::model::{
        common::election::ElectionStatus,
        db::{Candidate, Election},
    };

    #[test]
    fn from_tally() {
        let election = Election::closed_example(5, Utc::now());
        let candidates = vec![
            Candidate::example(1, 5, "Alice"),
            Candidate::example(2, 5, "Bob"),
        ];
        let counts = HashMap::from([(2, 3)]);
        let tally = Tally::new(election, ElectionStatus::Closed, candidates, &counts);

        let results = ElectionResults::from(tally);

        assert_eq!(results.election_id, 5);
        assert_eq!(results.election_name, "Past Referendum 5");
        assert!(results.is_closed);
        assert_eq!(results.total_votes, 3);
        assert_eq!(results.total_candidates, 2);
        assert_eq!(results.items[0].name, "Bob");
        assert_eq!(results.items[0].votes, 3);
        assert_eq!(results.items[1].votes, 0);
        assert_eq!(results.items[1].party, "Independent");
    }
}
