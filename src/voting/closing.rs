use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, trace, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::future::{BoxFuture, FutureExt},
    tokio::sync::Mutex,
    Build, Rocket,
};

use crate::model::{common::election::ElectionId, db::Election};
use crate::scheduled_task::ScheduledTask;
use crate::store::{MongoStore, VotingStore};

use super::{error::VotingError, service::VotingService};

/// Delay before a failed closer runs again.
const RETRY_INTERVAL_SECONDS: i64 = 300;

/// Map from election IDs to closer tasks.
type TaskMap = HashMap<ElectionId, ScheduledTask<Result<(), VotingError>>>;

/// Election closers: scheduled tasks that record an `ElectionClosed` audit
/// entry with the final tally once an election's window ends.
pub struct ElectionClosers<S> {
    service: VotingService<S>,
    tasks: Arc<Mutex<TaskMap>>,
}

impl<S> ElectionClosers<S>
where
    S: VotingStore,
{
    /// Create an empty set of closers.
    pub fn new(service: VotingService<S>) -> Self {
        Self {
            service,
            tasks: Default::default(),
        }
    }

    /// Does the given election have a closer scheduled?
    pub async fn has_closer(&self, election_id: ElectionId) -> bool {
        self.tasks.lock().await.contains_key(&election_id)
    }

    /// Schedule a closer for every election whose end lies after `now`.
    pub async fn schedule_elections(&self, now: DateTime<Utc>) -> Result<usize, VotingError> {
        let elections = self
            .service
            .store()
            .elections()
            .await
            .map_err(VotingError::from)?;
        let mut scheduled = 0;
        for election in elections
            .iter()
            .filter(|e| e.end_time.map_or(false, |end| end > now))
        {
            self.schedule_election(election).await;
            scheduled += 1;
        }
        Ok(scheduled)
    }

    /// Schedule a closer for the given election at its end instant.
    /// An existing closer is rescheduled; an election without an end gets none.
    pub async fn schedule_election(&self, election: &Election) {
        let end_time = match election.end_time {
            Some(end_time) => end_time,
            None => return,
        };
        let closer = Self::closer(election.id, self.service.clone(), self.tasks.clone());

        let mut tasks_locked = self.tasks.lock().await;
        if let Some(task) = tasks_locked.remove(&election.id) {
            if task.cancel().await {
                // A closer only completes after removing itself or rescheduling a retry.
                warn!(
                    "Closer for election {} had already completed when rescheduled",
                    election.id
                );
                return;
            }
        }
        tasks_locked.insert(election.id, ScheduledTask::new(closer, end_time));
        debug!("Scheduled closer for election {} at {end_time}", election.id);
    }

    /// Run the closer for the given election now rather than at its end instant.
    /// Has no effect if no closer is scheduled.
    pub async fn close_now(&self, election_id: ElectionId) -> Result<(), VotingError> {
        let task = self.tasks.lock().await.remove(&election_id);
        // The lock is released here, since the closer takes it when it finishes.
        match task {
            Some(closer) => {
                closer.trigger_now();
                closer.await.unwrap_or_else(|e| {
                    Err(VotingError::Internal(format!(
                        "closer for election {election_id} failed: {e}"
                    )))
                })
            }
            None => Ok(()),
        }
    }

    /// Record the closure of the given election, rescheduling itself on failure.
    /// Recursive, hence boxed.
    fn closer(
        election_id: ElectionId,
        service: VotingService<S>,
        tasks: Arc<Mutex<TaskMap>>,
    ) -> BoxFuture<'static, Result<(), VotingError>> {
        async move {
            let result = service
                .record_closure(election_id, Utc::now())
                .await
                .map(|_| ());
            match result {
                Ok(()) => {
                    tasks.lock().await.remove(&election_id);
                    trace!("Closer for election {election_id} completed; removed self from list");
                }
                Err(ref e) => {
                    error!("Closer for election {election_id} failed: {e}");
                    let retry = Self::closer(election_id, service, tasks.clone());
                    let retry_time = Utc::now() + Duration::seconds(RETRY_INTERVAL_SECONDS);
                    tasks
                        .lock()
                        .await
                        .insert(election_id, ScheduledTask::new(retry, retry_time));
                    warn!("Failed closer will be retried in {RETRY_INTERVAL_SECONDS} seconds");
                }
            }
            result
        }
        .boxed()
    }
}

/// A fairing that schedules closers for every election that has yet to end,
/// and places the `ElectionClosers` into managed state.
/// Must be attached after the fairing that manages the voting service.
pub struct ElectionCloserFairing;

#[rocket::async_trait]
impl Fairing for ElectionCloserFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election Closers",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        info!("Scheduling election closers...");
        let service = match rocket.state::<VotingService<MongoStore>>() {
            Some(service) => service.clone(),
            None => {
                error!("Voting service was not available when scheduling closers");
                return Err(rocket);
            }
        };
        let closers = ElectionClosers::new(service);
        match closers.schedule_elections(Utc::now()).await {
            Ok(count) => info!("...{count} election closers scheduled!"),
            Err(e) => {
                error!("Failed to schedule election closers: {e}");
                return Err(rocket);
            }
        }

        Ok(rocket.manage(closers))
    }
}
