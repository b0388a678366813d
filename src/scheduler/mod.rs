//! Periodic Task Runner - fixed-interval scheduling without drift
//!
//! Runs a task every `interval`, starting one full interval after the call.
//! When a run overshoots, missed ticks are skipped instead of replayed:
//!
//! ```text
//! target += floor((now - target) / interval) * interval + interval
//! ```
//!
//! A failing task is fatal by default (the process exits), so a broken
//! quota reset or observation cycle is visible instead of silently stalling.

use chrono::{DateTime, Timelike, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{ObserverError, Result};

/// What the runner does when the task returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log and terminate the process with exit code 1
    #[default]
    ExitProcess,
    /// Stop the loop and return the failure through the join handle
    Stop,
}

/// A named task scheduled at a fixed interval
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    name: String,
    interval: Duration,
    on_failure: FailurePolicy,
}

impl PeriodicTask {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            on_failure: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Spawn the loop on its own tokio task
    ///
    /// The handle only resolves when the task fails under `FailurePolicy::Stop`
    /// or the runtime shuts down.
    pub fn spawn<F, Fut>(self, task: F) -> JoinHandle<Result<()>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        tokio::spawn(self.run(task))
    }

    /// Drive the loop on the current task
    pub async fn run<F, Fut>(self, mut task: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.interval.is_zero() {
            return Err(ObserverError::Config(format!(
                "task '{}' scheduled with a zero interval",
                self.name
            )));
        }

        tracing::info!(
            task = %self.name,
            interval_secs = self.interval.as_secs_f64(),
            "Periodic task scheduled"
        );

        let mut target = Instant::now() + self.interval;

        loop {
            tokio::time::sleep_until(target).await;

            if let Err(e) = task().await {
                tracing::error!(task = %self.name, error = %e, "Scheduled task failed");
                match self.on_failure {
                    FailurePolicy::ExitProcess => std::process::exit(1),
                    FailurePolicy::Stop => {
                        return Err(ObserverError::SchedulerTaskFailure {
                            task: self.name.clone(),
                            reason: e.to_string(),
                        })
                    }
                }
            }

            let now = Instant::now();
            let next = next_target(target, now, self.interval);
            let skipped = missed_ticks(target, now, self.interval);
            if skipped > 0 {
                tracing::warn!(
                    task = %self.name,
                    skipped = skipped as u64,
                    "Behind schedule, skipping missed ticks"
                );
            }
            target = next;
        }
    }
}

/// Number of whole intervals elapsed since `target`
fn missed_ticks(target: Instant, now: Instant, interval: Duration) -> u128 {
    now.saturating_duration_since(target).as_nanos() / interval.as_nanos()
}

/// Next absolute deadline after a run that was due at `target` and ended at `now`
pub fn next_target(target: Instant, now: Instant, interval: Duration) -> Instant {
    let steps = missed_ticks(target, now, interval) + 1;
    let offset = interval.as_nanos().saturating_mul(steps);
    target + Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX))
}

/// Time left until the next wall-clock minute boundary
pub fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute =
        Duration::from_secs(now.second() as u64) + Duration::from_nanos(now.nanosecond() as u64);
    Duration::from_secs(60).saturating_sub(into_minute)
}

/// Sleep until the start of the next UTC minute
pub async fn align_to_minute() {
    let wait = until_next_minute(Utc::now());
    tracing::info!(wait_ms = wait.as_millis() as u64, "Aligning to minute boundary");
    tokio::time::sleep(wait).await;
}
