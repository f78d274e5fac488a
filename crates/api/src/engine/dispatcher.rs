//! Background job dispatcher.
//!
//! Pulls queued jobs onto workers, never running more than `max_workers`
//! at once. Wakes on submission and worker completion, with a fixed-interval
//! poll as a fallback.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::EngineConfig;
use crate::engine::jobs::JobEngine;
use crate::engine::worker::Worker;

/// Background job dispatcher.
///
/// A single long-lived Tokio task. Each worker it starts holds one permit
/// of `slots` until its job is terminal.
pub struct JobDispatcher {
    engine: Arc<JobEngine>,
    worker: Worker,
    slots: Arc<Semaphore>,
    max_workers: usize,
    tracker: TaskTracker,
    poll_interval: Duration,
    shutdown_timeout: Duration,
}

impl JobDispatcher {
    pub fn new(engine: Arc<JobEngine>, worker: Worker, config: &EngineConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(config.max_workers)),
            max_workers: config.max_workers,
            engine,
            worker,
            tracker: TaskTracker::new(),
            poll_interval: config.poll_interval,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Run the dispatcher loop until the cancellation token is triggered,
    /// then wait (bounded) for in-flight workers.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            max_workers = self.max_workers,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Job dispatcher started",
        );

        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_closed) => break,
                },
            };

            if self.dispatch_one(permit).await {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.engine.work_available() => {}
                _ = ticker.tick() => {}
            }
        }

        tracing::info!("Job dispatcher shutting down");
        self.drain().await;
    }

    /// Claim the head of the queue and start a supervised worker for it.
    ///
    /// Returns `false` when nothing was started; the permit is released.
    async fn dispatch_one(&self, permit: OwnedSemaphorePermit) -> bool {
        let job = match self.engine.claim_next().await {
            Ok(Some(job)) => job,
            Ok(None) => return false,
            Err(e) => {
                tracing::error!(error = %e, "Dispatch cycle failed");
                return false;
            }
        };

        tracing::info!(
            job_id = %job.id,
            in_flight = self.max_workers.saturating_sub(self.slots.available_permits()),
            "Job claimed by worker",
        );
        self.tracker.spawn(self.worker.clone().supervise(job, permit));
        true
    }

    async fn drain(&self) {
        self.tracker.close();
        let in_flight = self.tracker.len();
        if in_flight == 0 {
            return;
        }

        tracing::info!(in_flight, "Waiting for in-flight workers");
        if tokio::time::timeout(self.shutdown_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                remaining = self.tracker.len(),
                "Shutdown timeout elapsed with workers still running",
            );
        }
    }
}
