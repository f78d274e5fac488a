//! Worker: runs the frame pipeline for one claimed job.

use std::any::Any;
use std::sync::Arc;

use reface_core::job::{Job, JobError, JobErrorKind};
use reface_core::job_events::{MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_FAILED, MSG_TYPE_JOB_STARTED};
use reface_core::types::JobId;
use reface_pipeline::{FramePipeline, JobSpec};
use tokio::sync::OwnedSemaphorePermit;

use crate::engine::events;
use crate::engine::jobs::JobEngine;
use crate::engine::progress::RegistryProgress;
use crate::ws::WsManager;

/// Everything a worker needs; shared by all workers.
#[derive(Clone)]
pub struct Worker {
    engine: Arc<JobEngine>,
    pipeline: Arc<FramePipeline>,
    ws_manager: Arc<WsManager>,
}

impl Worker {
    pub fn new(
        engine: Arc<JobEngine>,
        pipeline: Arc<FramePipeline>,
        ws_manager: Arc<WsManager>,
    ) -> Self {
        Self {
            engine,
            pipeline,
            ws_manager,
        }
    }

    /// Execute `job` (already `Processing`) and record its terminal state.
    pub async fn run(&self, job: Job) {
        let job_id = job.id;
        events::publish(&self.ws_manager, MSG_TYPE_JOB_STARTED, &job).await;

        let registry = self.engine.registry();
        let sink = RegistryProgress::new(job_id, Arc::clone(registry), Arc::clone(&self.ws_manager));
        let spec = JobSpec::from(&job);

        let terminal = match self.pipeline.run(&spec, &sink).await {
            Ok(output) => {
                tracing::info!(
                    job_id = %job_id,
                    total_frames = output.total_frames,
                    swapped_frames = output.swapped_frames,
                    output = %output.output_path.display(),
                    "Job completed",
                );
                registry
                    .set_completed(job_id, output.output_path)
                    .await
                    .map(|job| (MSG_TYPE_JOB_COMPLETED, job))
            }
            Err(err) => {
                tracing::warn!(
                    job_id = %job_id,
                    stage = %err.stage,
                    kind = %err.kind,
                    error = %err.detail,
                    "Job failed",
                );
                registry
                    .set_failed(job_id, err.into())
                    .await
                    .map(|job| (MSG_TYPE_JOB_FAILED, job))
            }
        };

        match terminal {
            Ok((event_type, job)) => events::publish(&self.ws_manager, event_type, &job).await,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to record terminal state");
            }
        }
    }

    /// Run the worker for `job` in its own task and guarantee a terminal
    /// state afterwards.
    ///
    /// If the worker panics, is aborted or returns without finishing the
    /// job, the job is failed with [`JobErrorKind::InternalWorkerFault`].
    /// `permit` is held until then, so the concurrency slot is only freed
    /// once the job is terminal.
    pub async fn supervise(self, job: Job, permit: OwnedSemaphorePermit) {
        let job_id = job.id;
        let worker = self.clone();
        let outcome = tokio::spawn(async move { worker.run(job).await }).await;

        let fault = match outcome {
            Ok(()) => None,
            Err(e) if e.is_panic() => {
                let detail = panic_message(e.into_panic());
                tracing::error!(job_id = %job_id, panic = %detail, "Worker panicked");
                Some(format!("worker panicked: {detail}"))
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Worker task aborted");
                Some("worker task was aborted".to_string())
            }
        };

        self.ensure_terminal(job_id, fault).await;

        drop(permit);
        self.engine.notify_dispatcher();
    }

    async fn ensure_terminal(&self, job_id: JobId, fault: Option<String>) {
        let registry = self.engine.registry();
        let Some(current) = registry.get(job_id).await else {
            tracing::error!(job_id = %job_id, "Supervised job vanished from registry");
            return;
        };
        if current.status.is_terminal() {
            return;
        }

        let detail = fault.unwrap_or_else(|| "worker exited without a terminal state".to_string());
        let error = JobError::new(JobErrorKind::InternalWorkerFault, detail);
        match registry.set_failed(job_id, error).await {
            Ok(job) => events::publish(&self.ws_manager, MSG_TYPE_JOB_FAILED, &job).await,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to force-fail job");
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
