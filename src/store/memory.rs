use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::model::{
    common::election::{CandidateId, ElectionId},
    db::{AuditEntry, Candidate, Election, Vote},
    mongodb::Id,
};

use super::{
    AuditFilter, AuditLog, RecordOutcome, ReferenceStore, StoreError, StoreResult, VoteLedger,
};

/// Thread-safe in-memory storage, for tests only.
///
/// A single lock guards every table, so each operation is atomic. Faults can
/// be switched on to exercise the error paths of the voting layer.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

#[derive(Default)]
struct Tables {
    elections: BTreeMap<ElectionId, Election>,
    candidates: BTreeMap<CandidateId, Candidate>,
    votes: Vec<Vote>,
    audit_log: Vec<AuditEntry>,
    next_election_id: ElectionId,
    next_candidate_id: CandidateId,
}

/// Allocate the next ID, skipping past any ID already in `table`.
fn allocate<T>(next: &mut u32, table: &BTreeMap<u32, T>) -> u32 {
    let id = (*next).max(table.keys().next_back().map_or(1, |id| id + 1));
    *next = id + 1;
    id
}

#[derive(Default)]
struct Faults {
    audit_writes: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every audit write fail, including the one inside `record_vote`.
    pub fn fail_audit_writes(&self, fail: bool) {
        self.faults.audit_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every operation fail as if the backend were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert an election with a caller-chosen ID.
    pub fn insert_election(&self, election: Election) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.elections.insert(election.id, election);
        }
    }

    /// Insert a candidate with a caller-chosen ID.
    pub fn insert_candidate(&self, candidate: Candidate) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.candidates.insert(candidate.id, candidate);
        }
    }

    /// Every stored vote, in insertion order.
    pub fn votes(&self) -> Vec<Vote> {
        self.tables
            .lock()
            .map(|tables| tables.votes.clone())
            .unwrap_or_default()
    }

    /// Every audit entry, in insertion order.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.tables
            .lock()
            .map(|tables| tables.audit_log.clone())
            .unwrap_or_default()
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn audit_writes_fail(&self) -> bool {
        self.faults.audit_writes.load(Ordering::SeqCst)
    }
}

#[rocket::async_trait]
impl ReferenceStore for MemoryStore {
    async fn election(&self, id: ElectionId) -> StoreResult<Option<Election>> {
        Ok(self.tables()?.elections.get(&id).cloned())
    }

    async fn elections(&self) -> StoreResult<Vec<Election>> {
        Ok(self.tables()?.elections.values().cloned().collect())
    }

    async fn candidate(&self, id: CandidateId) -> StoreResult<Option<Candidate>> {
        Ok(self.tables()?.candidates.get(&id).cloned())
    }

    async fn candidates(&self, election_id: ElectionId) -> StoreResult<Vec<Candidate>> {
        Ok(self
            .tables()?
            .candidates
            .values()
            .filter(|c| c.stands_in(election_id))
            .cloned()
            .collect())
    }

    async fn next_election_id(&self) -> StoreResult<ElectionId> {
        let mut guard = self.tables()?;
        let tables = &mut *guard;
        Ok(allocate(&mut tables.next_election_id, &tables.elections))
    }

    async fn next_candidate_id(&self) -> StoreResult<CandidateId> {
        let mut guard = self.tables()?;
        let tables = &mut *guard;
        Ok(allocate(&mut tables.next_candidate_id, &tables.candidates))
    }

    async fn create_election(&self, election: &Election, created_entry: AuditEntry) -> StoreResult<()> {
        let mut tables = self.tables()?;
        if tables.elections.values().any(|e| e.name == election.name) {
            return Err(StoreError::Duplicate(format!(
                "election named '{}'",
                election.name
            )));
        }
        if self.audit_writes_fail() {
            return Err(StoreError::AuditWrite("injected audit failure".to_string()));
        }
        tables.elections.insert(election.id, election.clone());
        tables.audit_log.push(created_entry);
        Ok(())
    }

    async fn add_candidate(&self, candidate: &Candidate, added_entry: AuditEntry) -> StoreResult<()> {
        let mut tables = self.tables()?;
        if tables
            .candidates
            .values()
            .any(|c| c.stands_in(candidate.election_id) && c.name == candidate.name)
        {
            return Err(StoreError::Duplicate(format!(
                "candidate named '{}' in election {}",
                candidate.name, candidate.election_id
            )));
        }
        if self.audit_writes_fail() {
            return Err(StoreError::AuditWrite("injected audit failure".to_string()));
        }
        tables.candidates.insert(candidate.id, candidate.clone());
        tables.audit_log.push(added_entry);
        Ok(())
    }
}

#[rocket::async_trait]
impl VoteLedger for MemoryStore {
    async fn has_voted(&self, election_id: ElectionId, voter_id: Id) -> StoreResult<bool> {
        Ok(self
            .tables()?
            .votes
            .iter()
            .any(|v| v.election_id == election_id && v.voter_id == voter_id))
    }

    async fn record_vote(&self, vote: Vote, cast_entry: AuditEntry) -> StoreResult<RecordOutcome> {
        let mut tables = self.tables()?;
        if tables
            .votes
            .iter()
            .any(|v| v.election_id == vote.election_id && v.voter_id == vote.voter_id)
        {
            return Ok(RecordOutcome::AlreadyVoted);
        }

        if self.audit_writes_fail() {
            return Err(StoreError::AuditWrite("injected audit failure".to_string()));
        }
        tables.votes.push(vote.clone());
        tables.audit_log.push(cast_entry);
        Ok(RecordOutcome::Recorded(vote))
    }

    async fn vote_counts(&self, election_id: ElectionId) -> StoreResult<HashMap<CandidateId, u64>> {
        let mut counts = HashMap::new();
        for vote in self
            .tables()?
            .votes
            .iter()
            .filter(|v| v.election_id == election_id)
        {
            *counts.entry(vote.candidate_id).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[rocket::async_trait]
impl AuditLog for MemoryStore {
    async fn append(&self, entry: AuditEntry) -> StoreResult<Id> {
        let mut tables = self.tables()?;
        if self.audit_writes_fail() {
            return Err(StoreError::AuditWrite("injected audit failure".to_string()));
        }
        let id = entry.id;
        tables.audit_log.push(entry);
        Ok(id)
    }

    async fn trail(
        &self,
        filter: &AuditFilter,
        skip: u64,
        limit: u32,
    ) -> StoreResult<(Vec<AuditEntry>, u64)> {
        let mut matching = self
            .tables()?
            .audit_log
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|a, b| (a.timestamp, a.id).cmp(&(b.timestamp, b.id)));
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }
}
