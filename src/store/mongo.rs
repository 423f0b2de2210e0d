use std::collections::HashMap;
use std::time::Duration;

use log::{debug, warn};
use mongodb::{
    bson::{doc, from_document, DateTime as BsonDateTime, Document},
    error::Error as DbError,
    options::{Acknowledgment, FindOptions, ReadConcern, TransactionOptions, WriteConcern},
    Client, ClientSession, Database,
};
use rand::Rng;
use rocket::futures::TryStreamExt;
use rocket::tokio::time::{sleep, Instant};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{CandidateId, ElectionId},
    db::{AuditEntry, Candidate, Election, Vote},
    mongodb::{
        is_duplicate_key_error, is_transient_transaction_error, is_unknown_commit_result, Coll,
        Counter, Id, MongoCollection, CANDIDATE_ID_COUNTER_ID, ELECTION_ID_COUNTER_ID,
    },
};

use super::{
    AuditFilter, AuditLog, RecordOutcome, ReferenceStore, StoreError, StoreResult, VoteLedger,
};

/// How many times a commit with an unknown result is retried.
const MAX_COMMIT_ATTEMPTS: u32 = 3;
/// Upper bound of the first backoff delay after a transient transaction failure.
const FIRST_BACKOFF_MILLIS: u64 = 5;
/// Upper bound of any single backoff delay.
const MAX_BACKOFF_MILLIS: u64 = 250;

/// MongoDB-backed storage. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    commit_timeout: Duration,
}

/// What happened to a document inserted together with its audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Insertion {
    Inserted,
    /// A unique index already holds the document's key; nothing was written.
    Duplicate,
}

/// Where in a transaction a failure happened.
enum TransactionFailure {
    Insert(DbError),
    Audit(DbError),
    Commit(DbError),
}

impl TransactionFailure {
    fn error(&self) -> &DbError {
        match self {
            Self::Insert(e) | Self::Audit(e) | Self::Commit(e) => e,
        }
    }
}

impl From<TransactionFailure> for StoreError {
    fn from(failure: TransactionFailure) -> Self {
        match failure {
            TransactionFailure::Audit(e) => StoreError::AuditWrite(e.to_string()),
            TransactionFailure::Insert(e) | TransactionFailure::Commit(e) => e.into(),
        }
    }
}

/// A random delay before the given retry, growing exponentially up to a cap.
fn backoff(attempt: u32) -> Duration {
    let ceiling = FIRST_BACKOFF_MILLIS
        .saturating_mul(1 << attempt.saturating_sub(1).min(16))
        .min(MAX_BACKOFF_MILLIS);
    Duration::from_millis(rand::thread_rng().gen_range(1..=ceiling))
}

impl MongoStore {
    /// Wrap a connected client. `commit_timeout` bounds how long the server may spend
    /// committing, and how long transient transaction failures are retried.
    pub fn new(client: Client, db: Database, commit_timeout: Duration) -> Self {
        Self {
            client,
            db,
            commit_timeout,
        }
    }

    fn elections_coll(&self) -> Coll<Election> {
        Coll::from_db(&self.db)
    }

    fn candidates_coll(&self) -> Coll<Candidate> {
        Coll::from_db(&self.db)
    }

    fn votes_coll(&self) -> Coll<Vote> {
        Coll::from_db(&self.db)
    }

    fn audit_coll(&self) -> Coll<AuditEntry> {
        Coll::from_db(&self.db)
    }

    fn counters_coll(&self) -> Coll<Counter> {
        Coll::from_db(&self.db)
    }

    fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .max_commit_time(self.commit_timeout)
            .build()
    }

    /// Insert `document` and `entry` in one transaction.
    ///
    /// Transient failures, e.g. a write conflict with a concurrent insert of the
    /// same key, are retried after a jittered backoff until `commit_timeout` has
    /// passed. A retry then finds the committed key and reports `Duplicate`. If
    /// the conflicts outlast the deadline the store is reported unavailable.
    async fn insert_with_audit<T>(&self, document: &T, entry: &AuditEntry) -> StoreResult<Insertion>
    where
        T: Serialize + MongoCollection + Send + Sync,
    {
        let mut session = self.client.start_session(None).await?;
        let deadline = Instant::now() + self.commit_timeout;
        let mut attempt = 1;
        loop {
            match self.try_insert_with_audit(&mut session, document, entry).await {
                Ok(insertion) => return Ok(insertion),
                Err(failure) if is_transient_transaction_error(failure.error()) => {
                    if Instant::now() >= deadline {
                        warn!(
                            "Transaction on {} still conflicting after {attempt} attempts: {}",
                            T::NAME,
                            failure.error()
                        );
                        return Err(StoreError::Unavailable(format!(
                            "transaction on {} kept failing: {}",
                            T::NAME,
                            failure.error()
                        )));
                    }
                    let delay = backoff(attempt);
                    debug!(
                        "Transaction on {} failed transiently (attempt {attempt}), retry in {}ms: {}",
                        T::NAME,
                        delay.as_millis(),
                        failure.error()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.into()),
            }
        }
    }

    /// One attempt at the insert transaction.
    async fn try_insert_with_audit<T>(
        &self,
        session: &mut ClientSession,
        document: &T,
        entry: &AuditEntry,
    ) -> Result<Insertion, TransactionFailure>
    where
        T: Serialize + MongoCollection + Send + Sync,
    {
        session
            .start_transaction(self.transaction_options())
            .await
            .map_err(TransactionFailure::Insert)?;

        if let Err(e) = Coll::<T>::from_db(&self.db)
            .insert_one_with_session(document, None, session)
            .await
        {
            abort(session).await;
            return if is_duplicate_key_error(&e) {
                Ok(Insertion::Duplicate)
            } else {
                Err(TransactionFailure::Insert(e))
            };
        }

        if let Err(e) = self
            .audit_coll()
            .insert_one_with_session(entry, None, session)
            .await
        {
            abort(session).await;
            return Err(TransactionFailure::Audit(e));
        }

        let mut attempt = 1;
        loop {
            match session.commit_transaction().await {
                Ok(()) => return Ok(Insertion::Inserted),
                Err(e) if is_unknown_commit_result(&e) && attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!("Commit into {} has unknown result, retrying: {e}", T::NAME);
                    attempt += 1;
                }
                Err(e) => return Err(TransactionFailure::Commit(e)),
            }
        }
    }
}

/// Abort the session's transaction. The server may already have aborted it
/// after a failed write, so errors here carry no information.
async fn abort(session: &mut ClientSession) {
    if let Err(e) = session.abort_transaction().await {
        debug!("Abort after failed transaction reported: {e}");
    }
}

#[rocket::async_trait]
impl ReferenceStore for MongoStore {
    async fn election(&self, id: ElectionId) -> StoreResult<Option<Election>> {
        Ok(self.elections_coll().find_one(doc! { "_id": id }, None).await?)
    }

    async fn elections(&self) -> StoreResult<Vec<Election>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        Ok(self
            .elections_coll()
            .find(None, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn candidate(&self, id: CandidateId) -> StoreResult<Option<Candidate>> {
        Ok(self
            .candidates_coll()
            .find_one(doc! { "_id": id }, None)
            .await?)
    }

    async fn candidates(&self, election_id: ElectionId) -> StoreResult<Vec<Candidate>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        Ok(self
            .candidates_coll()
            .find(doc! { "election_id": election_id }, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn next_election_id(&self) -> StoreResult<ElectionId> {
        Counter::next(&self.counters_coll(), ELECTION_ID_COUNTER_ID).await
    }

    async fn next_candidate_id(&self) -> StoreResult<CandidateId> {
        Counter::next(&self.counters_coll(), CANDIDATE_ID_COUNTER_ID).await
    }

    async fn create_election(&self, election: &Election, created_entry: AuditEntry) -> StoreResult<()> {
        match self.insert_with_audit(election, &created_entry).await? {
            Insertion::Inserted => Ok(()),
            Insertion::Duplicate => Err(StoreError::Duplicate(format!(
                "election named '{}'",
                election.name
            ))),
        }
    }

    async fn add_candidate(&self, candidate: &Candidate, added_entry: AuditEntry) -> StoreResult<()> {
        match self.insert_with_audit(candidate, &added_entry).await? {
            Insertion::Inserted => Ok(()),
            Insertion::Duplicate => Err(StoreError::Duplicate(format!(
                "candidate named '{}' in election {}",
                candidate.name, candidate.election_id
            ))),
        }
    }
}

/// One row of the tally aggregation.
#[derive(Deserialize)]
struct CandidateVotes {
    #[serde(rename = "_id")]
    candidate_id: CandidateId,
    votes: u64,
}

#[rocket::async_trait]
impl VoteLedger for MongoStore {
    async fn has_voted(&self, election_id: ElectionId, voter_id: Id) -> StoreResult<bool> {
        let filter = doc! {
            "election_id": election_id,
            "voter_id": voter_id,
        };
        Ok(self.votes_coll().count_documents(filter, None).await? > 0)
    }

    async fn record_vote(&self, vote: Vote, cast_entry: AuditEntry) -> StoreResult<RecordOutcome> {
        match self.insert_with_audit(&vote, &cast_entry).await? {
            Insertion::Inserted => Ok(RecordOutcome::Recorded(vote)),
            Insertion::Duplicate => Ok(RecordOutcome::AlreadyVoted),
        }
    }

    async fn vote_counts(&self, election_id: ElectionId) -> StoreResult<HashMap<CandidateId, u64>> {
        let pipeline = [
            doc! { "$match": { "election_id": election_id } },
            doc! { "$group": { "_id": "$candidate_id", "votes": { "$sum": 1 } } },
        ];
        let mut cursor = self.votes_coll().aggregate(pipeline, None).await?;
        let mut counts = HashMap::new();
        while let Some(group) = cursor.try_next().await? {
            let group: CandidateVotes = from_document(group)?;
            counts.insert(group.candidate_id, group.votes);
        }
        Ok(counts)
    }
}

impl From<&AuditFilter> for Document {
    fn from(filter: &AuditFilter) -> Self {
        let mut document = Document::new();
        if let Some(action) = filter.action {
            document.insert("action", action);
        }
        if let Some(user_id) = filter.user_id {
            document.insert("user_id", user_id);
        }
        if let Some(election_id) = filter.election_id {
            document.insert("election_id", election_id);
        }
        let mut timestamp = Document::new();
        if let Some(from) = filter.from {
            timestamp.insert("$gte", BsonDateTime::from_chrono(from));
        }
        if let Some(to) = filter.to {
            timestamp.insert("$lte", BsonDateTime::from_chrono(to));
        }
        if !timestamp.is_empty() {
            document.insert("timestamp", timestamp);
        }
        document
    }
}

#[rocket::async_trait]
impl AuditLog for MongoStore {
    async fn append(&self, entry: AuditEntry) -> StoreResult<Id> {
        self.audit_coll()
            .insert_one(&entry, None)
            .await
            .map_err(|e| StoreError::AuditWrite(e.to_string()))?;
        Ok(entry.id)
    }

    async fn trail(
        &self,
        filter: &AuditFilter,
        skip: u64,
        limit: u32,
    ) -> StoreResult<(Vec<AuditEntry>, u64)> {
        let filter = Document::from(filter);
        let options = FindOptions::builder()
            .sort(doc! { "timestamp": 1, "_id": 1 })
            .skip(skip)
            .limit(i64::from(limit))
            .build();
        let entries = self
            .audit_coll()
            .find(filter.clone(), options)
            .await?
            .try_collect()
            .await?;
        let total = self.audit_coll().count_documents(filter, None).await?;
        Ok((entries, total))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rocket::tokio;

    use super::*;
    use crate::model::common::audit::AuditAction;

    async fn seeded(store: &MongoStore) -> (Election, Candidate) {
        let now = Utc::now();
        let election = Election {
            id: store.next_election_id().await.unwrap(),
            name: "Ledger test".to_string(),
            start_time: Some(now - Duration::hours(1)),
            end_time: Some(now + Duration::hours(1)),
        };
        let created = AuditEntry::new(None, AuditAction::ElectionCreated, "created", now)
            .for_election(election.id);
        store.create_election(&election, created).await.unwrap();

        let candidate = Candidate {
            id: store.next_candidate_id().await.unwrap(),
            election_id: election.id,
            name: "Ada".to_string(),
            party: "Engines".to_string(),
        };
        let added = AuditEntry::new(None, AuditAction::CandidateAdded, "added", now)
            .for_election(election.id);
        store.add_candidate(&candidate, added).await.unwrap();
        (election, candidate)
    }

    fn cast_entry(vote: &Vote) -> AuditEntry {
        AuditEntry::new(
            Some(vote.voter_id),
            AuditAction::VoteCast,
            format!("vote cast in election {}", vote.election_id),
            vote.cast_at,
        )
        .for_election(vote.election_id)
    }

    #[test]
    fn backoff_grows_within_bounds() {
        for _ in 0..50 {
            let first = backoff(1);
            assert!(first >= std::time::Duration::from_millis(1));
            assert!(first <= std::time::Duration::from_millis(FIRST_BACKOFF_MILLIS));

            let later = backoff(4);
            assert!(later <= std::time::Duration::from_millis(FIRST_BACKOFF_MILLIS * 8));

            let capped = backoff(40);
            assert!(capped <= std::time::Duration::from_millis(MAX_BACKOFF_MILLIS));
        }
    }

    #[backend_test]
    async fn records_vote_once(store: MongoStore) {
        let (election, candidate) = seeded(&store).await;
        let voter = Id::new();

        let vote = Vote::new(election.id, voter, candidate.id, Utc::now());
        let outcome = store.record_vote(vote.clone(), cast_entry(&vote)).await.unwrap();
        assert!(matches!(outcome, RecordOutcome::Recorded(_)));
        assert!(store.has_voted(election.id, voter).await.unwrap());

        let again = Vote::new(election.id, voter, candidate.id, Utc::now());
        let outcome = store.record_vote(again.clone(), cast_entry(&again)).await.unwrap();
        assert_eq!(outcome, RecordOutcome::AlreadyVoted);

        // Exactly one vote and one VoteCast entry.
        let counts = store.vote_counts(election.id).await.unwrap();
        assert_eq!(counts.get(&candidate.id), Some(&1));
        let filter = AuditFilter {
            action: Some(AuditAction::VoteCast),
            election_id: Some(election.id),
            ..Default::default()
        };
        let (_, total) = store.trail(&filter, 0, 10).await.unwrap();
        assert_eq!(total, 1);
    }

    #[backend_test]
    async fn audit_failure_rolls_back_vote(store: MongoStore, votes: Coll<Vote>) {
        let (election, candidate) = seeded(&store).await;
        let voter = Id::new();
        let vote = Vote::new(election.id, voter, candidate.id, Utc::now());
        let entry = cast_entry(&vote);

        // An existing entry with the same ID makes the audit insert fail.
        let squatter = AuditEntry {
            id: entry.id,
            ..AuditEntry::new(None, AuditAction::Logout, "squatter", Utc::now())
        };
        store.append(squatter).await.unwrap();

        let result = store.record_vote(vote, entry).await;
        assert!(matches!(result, Err(StoreError::AuditWrite(_))));

        assert!(!store.has_voted(election.id, voter).await.unwrap());
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 0);
        assert!(store.vote_counts(election.id).await.unwrap().is_empty());
    }

    #[backend_test]
    async fn audit_failure_rolls_back_election(store: MongoStore) {
        let entry = AuditEntry::new(None, AuditAction::ElectionCreated, "created", Utc::now());
        let squatter = AuditEntry {
            id: entry.id,
            ..AuditEntry::new(None, AuditAction::Logout, "squatter", Utc::now())
        };
        store.append(squatter).await.unwrap();

        let election = Election {
            id: store.next_election_id().await.unwrap(),
            name: "Board".to_string(),
            start_time: None,
            end_time: None,
        };
        let result = store.create_election(&election, entry).await;
        assert!(matches!(result, Err(StoreError::AuditWrite(_))));
        assert_eq!(store.election(election.id).await.unwrap(), None);

        // Nothing half-written blocks a retry under the same name.
        let retry = Election {
            id: store.next_election_id().await.unwrap(),
            ..election
        };
        let created = AuditEntry::new(None, AuditAction::ElectionCreated, "created", Utc::now());
        store.create_election(&retry, created).await.unwrap();
        assert_eq!(store.election(retry.id).await.unwrap(), Some(retry));
    }

    #[backend_test]
    async fn concurrent_votes_by_one_voter(store: MongoStore) {
        const ATTEMPTS: usize = 8;

        let (election, candidate) = seeded(&store).await;
        let voter = Id::new();

        let handles = (0..ATTEMPTS)
            .map(|_| {
                let store = store.clone();
                let vote = Vote::new(election.id, voter, candidate.id, Utc::now());
                tokio::spawn(async move { store.record_vote(vote.clone(), cast_entry(&vote)).await })
            })
            .collect::<Vec<_>>();

        let mut recorded = 0;
        for handle in handles {
            if let RecordOutcome::Recorded(_) = handle.await.unwrap().unwrap() {
                recorded += 1;
            }
        }
        assert_eq!(recorded, 1);

        let total: u64 = store.vote_counts(election.id).await.unwrap().values().sum();
        assert_eq!(total, 1);
    }

    #[backend_test]
    async fn duplicate_reference_data(store: MongoStore) {
        let (election, candidate) = seeded(&store).await;
        let now = Utc::now();

        let twin = Election {
            id: store.next_election_id().await.unwrap(),
            name: election.name.clone(),
            start_time: None,
            end_time: None,
        };
        let entry = AuditEntry::new(None, AuditAction::ElectionCreated, "created", now);
        let result = store.create_election(&twin, entry).await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));

        let twin = Candidate {
            id: store.next_candidate_id().await.unwrap(),
            party: "Other".to_string(),
            ..candidate
        };
        let entry = AuditEntry::new(None, AuditAction::CandidateAdded, "added", now);
        let result = store.add_candidate(&twin, entry).await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));

        // Rejected inserts leave no audit entries behind.
        let filter = AuditFilter {
            action: Some(AuditAction::ElectionCreated),
            ..Default::default()
        };
        let (_, total) = store.trail(&filter, 0, 10).await.unwrap();
        assert_eq!(total, 1);
    }

    #[backend_test]
    async fn trail_filters_and_orders(store: MongoStore) {
        let user = Id::new();
        let base = Utc::now();
        for (offset, action) in [
            (2, AuditAction::LoginSuccess),
            (0, AuditAction::VoteAttempt),
            (1, AuditAction::VoteAttempt),
        ] {
            let entry = AuditEntry::new(
                Some(user),
                action,
                format!("entry {offset}"),
                base + Duration::seconds(offset),
            );
            store.append(entry).await.unwrap();
        }
        store
            .append(AuditEntry::new(None, AuditAction::VoteAttempt, "anonymous", base).for_election(3))
            .await
            .unwrap();

        let filter = AuditFilter {
            action: Some(AuditAction::VoteAttempt),
            user_id: Some(user),
            ..Default::default()
        };
        let (entries, total) = store.trail(&filter, 0, 10).await.unwrap();
        assert_eq!(total, 2);
        let details = entries.iter().map(|e| e.detail.as_str()).collect::<Vec<_>>();
        assert_eq!(details, vec!["entry 0", "entry 1"]);

        let filter = AuditFilter {
            from: Some(base + Duration::seconds(1)),
            ..Default::default()
        };
        let (_, total) = store.trail(&filter, 0, 10).await.unwrap();
        assert_eq!(total, 2);

        let filter = AuditFilter {
            election_id: Some(3),
            ..Default::default()
        };
        let (entries, total) = store.trail(&filter, 0, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(entries[0].detail, "anonymous");
    }
}
