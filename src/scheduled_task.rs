use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use rocket::tokio::{
    self,
    sync::Notify,
    task::{JoinError, JoinHandle},
    time::{sleep, Duration},
};

/// A task that runs at a given instant, unless cancelled or triggered early.
///
/// Awaiting a `ScheduledTask` waits for its output.
pub struct ScheduledTask<T> {
    handle: JoinHandle<T>,
    trigger: Arc<Notify>,
    run_at: DateTime<Utc>,
}

impl<T> ScheduledTask<T>
where
    T: Send + 'static,
{
    /// Schedule `task` to run at `run_at`. An instant in the past runs it immediately.
    pub fn new<Fut>(task: Fut, run_at: DateTime<Utc>) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let early = trigger.clone();
        let delay = until(run_at);
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = early.notified() => {}
            }
            task.await
        });

        Self {
            handle,
            trigger,
            run_at,
        }
    }

    /// When the task is due.
    pub fn run_at(&self) -> DateTime<Utc> {
        self.run_at
    }

    /// Cancel the task. Returns true iff it had already completed.
    pub async fn cancel(self) -> bool {
        self.handle.abort();
        self.handle.await.is_ok()
    }

    /// Run the task now instead of at its scheduled instant.
    pub fn trigger_now(&self) {
        // `notify_one` stores a permit, so this works even before the task first polls.
        self.trigger.notify_one();
    }
}

impl<T> Future for ScheduledTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

/// The time from now until `instant`, or zero if it has passed.
fn until(instant: DateTime<Utc>) -> Duration {
    (instant - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}
