//! Job engine facade over the intake queue and the task registry.
//!
//! This is the only code that touches both structures. Lock order is
//! always queue, then registry, so a reader holding the queue lock sees a
//! claimed job either still queued or already processing, never both.

use std::sync::Arc;

use reface_core::error::CoreError;
use reface_core::job::{Job, JobStatus, JobSubmission};
use reface_core::job_events::MSG_TYPE_JOB_QUEUED;
use reface_core::types::JobId;
use reface_core::validation::validate_submission;
use tokio::sync::Notify;

use crate::engine::events;
use crate::engine::queue::IntakeQueue;
use crate::engine::registry::TaskRegistry;
use crate::ws::WsManager;

/// A freshly admitted job and its place in line.
#[derive(Debug, Clone)]
pub struct Admission {
    pub job: Job,
    pub queue_position: usize,
}

/// A job record with its queue position while queued.
#[derive(Debug, Clone)]
pub struct JobView {
    pub job: Job,
    pub queue_position: Option<usize>,
}

/// Queued jobs (head first) and jobs currently processing.
#[derive(Debug, Clone, Default)]
pub struct QueueOverview {
    pub queued: Vec<Job>,
    pub active: Vec<Job>,
}

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub total: usize,
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    fn tally<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut counts = Self::default();
        for job in jobs {
            counts.total += 1;
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.active += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

pub struct JobEngine {
    registry: Arc<dyn TaskRegistry>,
    queue: IntakeQueue,
    wake: Notify,
    ws_manager: Arc<WsManager>,
}

impl JobEngine {
    pub fn new(registry: Arc<dyn TaskRegistry>, ws_manager: Arc<WsManager>) -> Self {
        Self {
            registry,
            queue: IntakeQueue::new(),
            wake: Notify::new(),
            ws_manager,
        }
    }

    pub fn registry(&self) -> &Arc<dyn TaskRegistry> {
        &self.registry
    }

    /// Validate, register and enqueue a submission, then wake the
    /// dispatcher. A rejected submission leaves no trace.
    ///
    /// Validation runs on the blocking pool before the queue lock is taken.
    /// `job_queued` is published before the lock is released, so it always
    /// precedes the job's `job_started`.
    pub async fn submit(&self, submission: &JobSubmission) -> Result<Admission, CoreError> {
        let submission = submission.clone();
        let valid = tokio::task::spawn_blocking(move || validate_submission(submission))
            .await
            .map_err(|e| CoreError::Internal(format!("Validation task failed: {e}")))??;

        let admission = {
            let mut queue = self.queue.lock().await;
            let job = self.registry.create_job(&valid).await?;
            let queue_position = queue.push(job.id);
            events::publish(&self.ws_manager, MSG_TYPE_JOB_QUEUED, &job).await;
            Admission {
                job,
                queue_position,
            }
        };

        tracing::info!(
            job_id = %admission.job.id,
            queue_position = admission.queue_position,
            source = %admission.job.source_path.display(),
            "Job queued",
        );
        self.wake.notify_one();
        Ok(admission)
    }

    /// Look up a job; unknown ids are [`CoreError::NotFound`].
    pub async fn status(&self, id: JobId) -> Result<JobView, CoreError> {
        let queue = self.queue.lock().await;
        let job = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| CoreError::NotFound {
                entity: "Task",
                id: id.to_string(),
            })?;
        let queue_position = match job.status {
            JobStatus::Queued => queue.position(id),
            _ => None,
        };
        Ok(JobView {
            job,
            queue_position,
        })
    }

    /// Mark the head of the queue `Processing` and pop it, in one step.
    ///
    /// The head leaves the queue only once its record has moved on. A head
    /// whose record is missing or no longer `Queued` is stale and dropped;
    /// any other failure leaves it in place for the next cycle.
    pub async fn claim_next(&self) -> Result<Option<Job>, CoreError> {
        let mut queue = self.queue.lock().await;
        let Some(id) = queue.peek() else {
            return Ok(None);
        };
        match self.registry.set_processing(id).await {
            Ok(job) => {
                queue.pop();
                Ok(Some(job))
            }
            Err(e @ (CoreError::NotFound { .. } | CoreError::Conflict(_))) => {
                queue.pop();
                tracing::warn!(job_id = %id, error = %e, "Dropped stale queue entry");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn queue_overview(&self) -> QueueOverview {
        let queue = self.queue.lock().await;
        let ids = queue.ids();
        let all = self.registry.snapshot_all().await;
        drop(queue);

        let queued = ids
            .iter()
            .filter_map(|id| all.iter().find(|job| job.id == *id).cloned())
            .collect();
        let active = all
            .into_iter()
            .filter(|job| job.status == JobStatus::Processing)
            .collect();
        QueueOverview { queued, active }
    }

    pub async fn counts(&self) -> JobCounts {
        JobCounts::tally(&self.registry.snapshot_all().await)
    }

    /// Wake the dispatcher (submission or worker completion).
    pub fn notify_dispatcher(&self) {
        self.wake.notify_one();
    }

    /// Resolves on the next [`JobEngine::notify_dispatcher`], or immediately
    /// if one happened since the last wait.
    pub async fn work_available(&self) {
        self.wake.notified().await;
    }
}
