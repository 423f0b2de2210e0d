use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rocket::tokio::{self, time::timeout};

use crate::model::{
    auth::Role,
    common::{
        audit::{AuditAction, RejectionReason},
        election::{CandidateId, ElectionId, ElectionStatus},
    },
    db::{AuditEntry, Candidate, Election, Vote},
    mongodb::Id,
};
use crate::store::{AuditFilter, RecordOutcome, StoreError, StoreResult, VotingStore};

use super::{
    error::{Result, VotingError},
    guard,
    tally::{Participation, Tally},
};

/// A vote that has been committed, with the reference data it was cast against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastVote {
    pub vote: Vote,
    pub election: Election,
    pub candidate: Candidate,
}

/// An election together with its derived status and candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionOverview {
    pub election: Election,
    pub status: ElectionStatus,
    pub candidates: Vec<Candidate>,
}

/// The voting operations, over any storage backend.
///
/// Every storage read is bounded by the configured timeout. Vote casting runs
/// on its own task, so once started it reaches a definite outcome even if the
/// caller stops waiting.
#[derive(Clone)]
pub struct VotingService<S> {
    store: S,
    timeout: Duration,
    voter_population: u64,
}

impl<S> VotingService<S>
where
    S: VotingStore,
{
    pub fn new(store: S, timeout: Duration, voter_population: u64) -> Self {
        Self {
            store,
            timeout,
            voter_population,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a storage call under the request-scoped timeout.
    async fn bounded<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match timeout(self.timeout, operation).await {
            Ok(result) => result.map_err(VotingError::from),
            Err(_) => Err(VotingError::InfrastructureTimeout),
        }
    }

    /// Append an audit entry. Failure to do so is always surfaced.
    async fn audit(&self, entry: AuditEntry) -> Result<Id> {
        let action = entry.action;
        self.bounded(self.store.append(entry)).await.map_err(|e| {
            error!("Failed to append {action} audit entry: {e}");
            match e {
                VotingError::AuditWriteFailed(_) => e,
                other => VotingError::AuditWriteFailed(other.to_string()),
            }
        })
    }

    /// Audit a rejected vote attempt and hand back the rejection.
    /// If the audit entry cannot be written, that failure replaces the rejection.
    async fn rejected(
        &self,
        user_id: Option<Id>,
        election_id: ElectionId,
        rejection: VotingError,
        detail: String,
        now: DateTime<Utc>,
    ) -> VotingError {
        let reason = match rejection.rejection_reason() {
            Some(reason) => reason,
            None => return rejection,
        };
        debug!("Rejecting vote attempt: {detail}");
        match self
            .audit(AuditEntry::rejection(user_id, reason, detail, now).for_election(election_id))
            .await
        {
            Ok(_) => rejection,
            Err(audit_failure) => audit_failure,
        }
    }

    /// Cast a vote on behalf of `voter_id` at instant `now`.
    ///
    /// Every call leaves exactly one audit entry: `VoteCast` on success, or
    /// `VoteAttempt` carrying the rejection reason.
    pub async fn cast_vote(
        &self,
        election_id: ElectionId,
        voter_id: Id,
        candidate_id: CandidateId,
        now: DateTime<Utc>,
    ) -> Result<CastVote> {
        let service = self.clone();
        let task = tokio::spawn(async move {
            service
                .cast_vote_to_completion(election_id, voter_id, candidate_id, now)
                .await
        });
        task.await.unwrap_or_else(|e| {
            error!("Vote task for voter {voter_id} in election {election_id} died: {e}");
            Err(VotingError::Internal(format!("vote task failed: {e}")))
        })
    }

    async fn cast_vote_to_completion(
        &self,
        election_id: ElectionId,
        voter_id: Id,
        candidate_id: CandidateId,
        now: DateTime<Utc>,
    ) -> Result<CastVote> {
        let election = self.bounded(self.store.election(election_id)).await?;
        let candidate = self.bounded(self.store.candidate(candidate_id)).await?;
        let (election, candidate) = match (election, candidate) {
            (Some(election), Some(candidate)) => (election, candidate),
            (election, _) => {
                let missing = if election.is_none() {
                    format!("election {election_id}")
                } else {
                    format!("candidate {candidate_id}")
                };
                let detail = format!(
                    "unknown election/candidate: election {election_id}, candidate {candidate_id}"
                );
                return Err(self
                    .rejected(
                        Some(voter_id),
                        election_id,
                        VotingError::NotFound(missing),
                        detail,
                        now,
                    )
                    .await);
            }
        };

        if let Err(rejection) = guard::ensure_can_receive_vote(&election, &candidate, now) {
            let detail = rejection.to_string();
            return Err(self
                .rejected(Some(voter_id), election_id, rejection, detail, now)
                .await);
        }

        let vote = Vote::new(election.id, voter_id, candidate.id, now);
        let cast_entry = AuditEntry::new(
            Some(voter_id),
            AuditAction::VoteCast,
            format!(
                "vote cast in election {} for candidate {}",
                election.id, candidate.id
            ),
            now,
        )
        .for_election(election.id);
        match self.store.record_vote(vote, cast_entry).await? {
            RecordOutcome::Recorded(vote) => {
                info!(
                    "Vote {} recorded for voter {voter_id} in election {}",
                    vote.id, election.id
                );
                Ok(CastVote {
                    vote,
                    election,
                    candidate,
                })
            }
            RecordOutcome::AlreadyVoted => {
                let rejection = VotingError::AlreadyVoted {
                    voter_id,
                    election_id: election.id,
                };
                let detail = rejection.to_string();
                Err(self
                    .rejected(Some(voter_id), election_id, rejection, detail, now)
                    .await)
            }
        }
    }

    /// Audit a vote attempt that carried no valid identity.
    pub async fn reject_unauthenticated(
        &self,
        election_id: ElectionId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        warn!("Unauthenticated vote attempt in election {election_id}");
        let entry = AuditEntry::rejection(
            None,
            RejectionReason::Unauthenticated,
            format!("unauthenticated vote attempt in election {election_id}"),
            now,
        )
        .for_election(election_id);
        self.audit(entry).await.map(|_| ())
    }

    /// Audit a vote attempt by a user whose role may not vote.
    pub async fn reject_not_permitted(
        &self,
        user_id: Id,
        role: Role,
        election_id: ElectionId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        warn!("User {user_id} with role {role} attempted to vote in election {election_id}");
        let entry = AuditEntry::rejection(
            Some(user_id),
            RejectionReason::NotPermitted,
            format!("role {role} may not vote in election {election_id}"),
            now,
        )
        .for_election(election_id);
        self.audit(entry).await.map(|_| ())
    }

    /// Has the voter already cast a vote in the election?
    pub async fn has_voted(&self, election_id: ElectionId, voter_id: Id) -> Result<bool> {
        self.election(election_id).await?;
        self.bounded(self.store.has_voted(election_id, voter_id))
            .await
    }

    async fn election(&self, election_id: ElectionId) -> Result<Election> {
        self.bounded(self.store.election(election_id))
            .await?
            .ok_or_else(|| VotingError::NotFound(format!("election {election_id}")))
    }

    /// The election with its status at `now` and its candidates.
    pub async fn describe_election(
        &self,
        election_id: ElectionId,
        now: DateTime<Utc>,
    ) -> Result<ElectionOverview> {
        let election = self.election(election_id).await?;
        let candidates = self.bounded(self.store.candidates(election_id)).await?;
        Ok(ElectionOverview {
            status: election.status(now),
            election,
            candidates,
        })
    }

    /// Count the votes of an election, whatever its status.
    async fn count(&self, election: Election, now: DateTime<Utc>) -> Result<Tally> {
        let candidates = self.bounded(self.store.candidates(election.id)).await?;
        let counts = self.bounded(self.store.vote_counts(election.id)).await?;
        let status = election.status(now);
        Ok(Tally::new(election, status, candidates, &counts))
    }

    /// Load an election whose results may be computed: one that is active or closed.
    async fn countable_election(
        &self,
        election_id: ElectionId,
        now: DateTime<Utc>,
    ) -> Result<Election> {
        let election = self.election(election_id).await?;
        match election.status(now) {
            ElectionStatus::Scheduled => Err(VotingError::ElectionNotActive {
                election_id,
                status: ElectionStatus::Scheduled,
                at: now,
            }),
            _ => Ok(election),
        }
    }

    /// Per-candidate results of an active or closed election.
    ///
    /// Whether the caller may see live results of an active election is
    /// decided by the caller's capabilities, not here.
    pub async fn results(&self, election_id: ElectionId, now: DateTime<Utc>) -> Result<Tally> {
        let election = self.countable_election(election_id, now).await?;
        self.count(election, now).await
    }

    /// Turnout of an active or closed election against the voter population.
    pub async fn participation(
        &self,
        election_id: ElectionId,
        now: DateTime<Utc>,
    ) -> Result<Participation> {
        let election = self.countable_election(election_id, now).await?;
        let counts = self.bounded(self.store.vote_counts(election.id)).await?;
        let total_voted = counts.values().sum();
        Ok(Participation::new(
            election.id,
            total_voted,
            self.voter_population,
        ))
    }

    /// One page of the audit trail in history order, plus the total number of matches.
    pub async fn audit_trail(
        &self,
        filter: &AuditFilter,
        skip: u64,
        limit: u32,
    ) -> Result<(Vec<AuditEntry>, u64)> {
        self.bounded(self.store.trail(filter, skip, limit)).await
    }

    /// Create an election. Both instants may be left unset, but if both are
    /// set the start must precede the end.
    pub async fn create_election(
        &self,
        admin_id: Id,
        name: String,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Election> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(VotingError::InvalidSpec(
                "election name must not be empty".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (start_time, end_time) {
            if start >= end {
                return Err(VotingError::InvalidSpec(format!(
                    "election start {start} is not before its end {end}"
                )));
            }
        }

        let election = Election {
            id: self.bounded(self.store.next_election_id()).await?,
            name,
            start_time,
            end_time,
        };
        let created_entry = AuditEntry::new(
            Some(admin_id),
            AuditAction::ElectionCreated,
            format!("election {} '{}' created", election.id, election.name),
            now,
        )
        .for_election(election.id);
        self.store
            .create_election(&election, created_entry)
            .await
            .map_err(|e| log_audited_write_failure("election", e))?;
        info!("Created election {} '{}'", election.id, election.name);
        Ok(election)
    }

    /// Add a candidate to an election that has not started yet.
    pub async fn add_candidate(
        &self,
        admin_id: Id,
        election_id: ElectionId,
        name: String,
        party: String,
        now: DateTime<Utc>,
    ) -> Result<Candidate> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(VotingError::InvalidSpec(
                "candidate name must not be empty".to_string(),
            ));
        }
        let election = self.election(election_id).await?;
        if election.start_time.map_or(false, |start| start <= now) {
            return Err(VotingError::ElectionStarted { election_id });
        }

        let candidate = Candidate {
            id: self.bounded(self.store.next_candidate_id()).await?,
            election_id,
            name,
            party: party.trim().to_string(),
        };
        let added_entry = AuditEntry::new(
            Some(admin_id),
            AuditAction::CandidateAdded,
            format!(
                "candidate {} '{}' added to election {}",
                candidate.id, candidate.name, election_id
            ),
            now,
        )
        .for_election(election_id);
        self.store
            .add_candidate(&candidate, added_entry)
            .await
            .map_err(|e| log_audited_write_failure("candidate", e))?;
        info!(
            "Added candidate {} '{}' to election {election_id}",
            candidate.id, candidate.name
        );
        Ok(candidate)
    }

    /// Append the `ElectionClosed` entry summarising the tally at `now`.
    ///
    /// An election is closed at most once: if its `ElectionClosed` entry
    /// already exists, that entry's ID is returned and nothing is written.
    pub async fn record_closure(&self, election_id: ElectionId, now: DateTime<Utc>) -> Result<Id> {
        let election = self.election(election_id).await?;
        if let Some(existing) = self.closure_entry(election_id).await? {
            debug!("Closure of election {election_id} already recorded as {existing}");
            return Ok(existing);
        }
        let tally = self.count(election, now).await?;
        let id = self
            .audit(
                AuditEntry::new(None, AuditAction::ElectionClosed, tally.summary(), now)
                    .for_election(election_id),
            )
            .await?;
        info!("Recorded closure of election {election_id}");
        Ok(id)
    }

    /// The ID of the election's `ElectionClosed` entry, if there is one.
    async fn closure_entry(&self, election_id: ElectionId) -> Result<Option<Id>> {
        let filter = AuditFilter {
            action: Some(AuditAction::ElectionClosed),
            election_id: Some(election_id),
            ..Default::default()
        };
        let (entries, _) = self.bounded(self.store.trail(&filter, 0, 1)).await?;
        Ok(entries.first().map(|entry| entry.id))
    }
}

/// Log a failed reference-data insert. Audit failures are the ones worth an error.
fn log_audited_write_failure(what: &str, err: StoreError) -> VotingError {
    match &err {
        StoreError::AuditWrite(_) => error!("Failed to audit new {what}, nothing stored: {err}"),
        _ => warn!("Failed to store new {what}: {err}"),
    }
    VotingError::from(err)
}
