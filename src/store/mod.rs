//! Storage traits for reference data, the vote ledger and the audit log.
//!
//! The voting layer depends only on these traits. [`MongoStore`] is the
//! production backend; tests also use an in-process `MemoryStore`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{
    common::{
        audit::AuditAction,
        election::{CandidateId, ElectionId},
    },
    db::{AuditEntry, Candidate, Election, Vote},
    mongodb::Id,
};

mod error;
#[cfg(test)]
mod memory;
mod mongo;

pub use error::{StoreError, StoreResult};
#[cfg(test)]
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Read access to elections and candidates, plus the minimal administrative writes.
#[rocket::async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn election(&self, id: ElectionId) -> StoreResult<Option<Election>>;

    async fn elections(&self) -> StoreResult<Vec<Election>>;

    async fn candidate(&self, id: CandidateId) -> StoreResult<Option<Candidate>>;

    /// All candidates standing in the given election, ordered by ID.
    async fn candidates(&self, election_id: ElectionId) -> StoreResult<Vec<Candidate>>;

    /// Allocate a fresh election ID.
    async fn next_election_id(&self) -> StoreResult<ElectionId>;

    /// Allocate a fresh candidate ID.
    async fn next_candidate_id(&self) -> StoreResult<CandidateId>;

    /// Insert a new election together with its `ElectionCreated` audit entry, atomically.
    /// Fails with [`StoreError::Duplicate`] if the name is taken, and with
    /// [`StoreError::AuditWrite`] if the entry cannot be written; either way nothing is stored.
    async fn create_election(&self, election: &Election, created_entry: AuditEntry) -> StoreResult<()>;

    /// Insert a new candidate together with its `CandidateAdded` audit entry, atomically.
    /// Fails with [`StoreError::Duplicate`] if the name is taken within the election.
    async fn add_candidate(&self, candidate: &Candidate, added_entry: AuditEntry) -> StoreResult<()>;
}

/// What happened to an attempt to record a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The vote and its audit entry were committed together.
    Recorded(Vote),
    /// A vote by this voter in this election already exists; nothing was written.
    AlreadyVoted,
}

/// The append-only set of cast votes.
#[rocket::async_trait]
pub trait VoteLedger: Send + Sync {
    async fn has_voted(&self, election_id: ElectionId, voter_id: Id) -> StoreResult<bool>;

    /// Insert `vote` together with its `VoteCast` audit entry, atomically.
    ///
    /// Either both are durably written or neither is. The uniqueness of
    /// `(election_id, voter_id)` is checked at the instant of insertion, so
    /// concurrent attempts by one voter yield exactly one `Recorded`. If the
    /// audit entry cannot be written the vote is rolled back and
    /// [`StoreError::AuditWrite`] is returned.
    async fn record_vote(&self, vote: Vote, cast_entry: AuditEntry) -> StoreResult<RecordOutcome>;

    /// Number of votes per candidate in the election, counted from the vote rows.
    /// Candidates without votes are absent.
    async fn vote_counts(&self, election_id: ElectionId) -> StoreResult<HashMap<CandidateId, u64>>;
}

/// Which audit entries to return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub user_id: Option<Id>,
    pub election_id: Option<ElectionId>,
    /// Inclusive lower bound on the timestamp.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the timestamp.
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.action.map_or(true, |action| entry.action == action)
            && self.user_id.map_or(true, |user| entry.user_id == Some(user))
            && self
                .election_id
                .map_or(true, |election| entry.election_id == Some(election))
            && self.from.map_or(true, |from| entry.timestamp >= from)
            && self.to.map_or(true, |to| entry.timestamp <= to)
    }
}

/// The append-only audit log. There is no update or delete.
#[rocket::async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> StoreResult<Id>;

    /// One page of matching entries in history order (timestamp, then ID),
    /// plus the total number of matching entries.
    async fn trail(
        &self,
        filter: &AuditFilter,
        skip: u64,
        limit: u32,
    ) -> StoreResult<(Vec<AuditEntry>, u64)>;
}

/// Everything the voting layer needs from storage.
pub trait VotingStore: ReferenceStore + VoteLedger + AuditLog + Clone + 'static {}

impl<T> VotingStore for T where T: ReferenceStore + VoteLedger + AuditLog + Clone + 'static {}
