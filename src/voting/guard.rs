//! Checks that an election and candidate may receive a vote at a given instant.

use chrono::{DateTime, Utc};

use crate::model::db::{Candidate, Election};

use super::error::{Result, VotingError};

/// Fail with `ElectionNotActive` unless `election` is active at `now`.
pub fn ensure_active(election: &Election, now: DateTime<Utc>) -> Result<()> {
    let status = election.status(now);
    if status.is_active() {
        Ok(())
    } else {
        Err(VotingError::ElectionNotActive {
            election_id: election.id,
            status,
            at: now,
        })
    }
}

/// Fail with `InvalidCandidate` unless `candidate` stands in `election`.
pub fn ensure_candidate(election: &Election, candidate: &Candidate) -> Result<()> {
    if candidate.stands_in(election.id) {
        Ok(())
    } else {
        Err(VotingError::InvalidCandidate {
            candidate_id: candidate.id,
            election_id: election.id,
        })
    }
}

/// Run every check a vote must pass, timing first.
pub fn ensure_can_receive_vote(
    election: &Election,
    candidate: &Candidate,
    now: DateTime<Utc>,
) -> Result<()> {
    ensure_active(election, now)?;
    ensure_candidate(election, candidate)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::common::election::ElectionStatus;

    #[test]
    fn rejects_outside_window() {
        let now = Utc::now();
        let election = Election::active_example(1, now);
        let candidate = Candidate::example(1, 1, "Alice");

        assert!(ensure_can_receive_vote(&election, &candidate, now).is_ok());

        let too_early = election.start_time.unwrap() - Duration::seconds(1);
        match ensure_can_receive_vote(&election, &candidate, too_early) {
            Err(VotingError::ElectionNotActive { status, .. }) => {
                assert_eq!(status, ElectionStatus::Scheduled)
            }
            other => panic!("unexpected {other:?}"),
        }

        let too_late = election.end_time.unwrap() + Duration::seconds(1);
        match ensure_can_receive_vote(&election, &candidate, too_late) {
            Err(VotingError::ElectionNotActive { status, .. }) => {
                assert_eq!(status, ElectionStatus::Closed)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_foreign_candidate() {
        let now = Utc::now();
        let election = Election::active_example(1, now);
        let foreign = Candidate::example(9, 2, "Mallory");

        assert_eq!(
            ensure_can_receive_vote(&election, &foreign, now),
            Err(VotingError::InvalidCandidate {
                candidate_id: 9,
                election_id: 1,
            })
        );
    }

    #[test]
    fn timing_is_checked_before_membership() {
        let now = Utc::now();
        let election = Election::closed_example(1, now);
        let foreign = Candidate::example(9, 2, "Mallory");

        assert!(matches!(
            ensure_can_receive_vote(&election, &foreign, now),
            Err(VotingError::ElectionNotActive { .. })
        ));
    }
}
