//! Pipeline progress translated into registry writes and live events.

use std::sync::Arc;

use async_trait::async_trait;
use reface_core::error::CoreError;
use reface_core::job::Job;
use reface_core::job_events::MSG_TYPE_JOB_PROGRESS;
use reface_core::progress;
use reface_core::types::JobId;
use reface_pipeline::{ProgressSink, Stage};
use tokio::sync::Mutex;

use crate::engine::events;
use crate::engine::registry::TaskRegistry;
use crate::ws::WsManager;

/// [`ProgressSink`] for one job.
///
/// Every update is written to the registry at full precision. A
/// `job_progress` event goes out only when the rendered line a client
/// would display actually changes.
pub struct RegistryProgress {
    job_id: JobId,
    registry: Arc<dyn TaskRegistry>,
    ws_manager: Arc<WsManager>,
    last_rendered: Mutex<Option<String>>,
}

impl RegistryProgress {
    pub fn new(job_id: JobId, registry: Arc<dyn TaskRegistry>, ws_manager: Arc<WsManager>) -> Self {
        Self {
            job_id,
            registry,
            ws_manager,
            last_rendered: Mutex::new(None),
        }
    }

    async fn publish_if_changed(&self, update: Result<Job, CoreError>) {
        let job = match update {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(job_id = %self.job_id, error = %e, "Failed to record progress");
                return;
            }
        };

        let rendered = progress::render(job.progress, &job.message);
        {
            let mut last = self.last_rendered.lock().await;
            if last.as_deref() == Some(rendered.as_str()) {
                return;
            }
            *last = Some(rendered);
        }
        events::publish(&self.ws_manager, MSG_TYPE_JOB_PROGRESS, &job).await;
    }
}

#[async_trait]
impl ProgressSink for RegistryProgress {
    async fn stage_started(&self, stage: Stage) {
        tracing::debug!(job_id = %self.job_id, stage = %stage, "Stage started");
        let update = self.registry.set_message(self.job_id, stage.message()).await;
        self.publish_if_changed(update).await;
    }

    async fn frame_processed(&self, done: usize, total: usize) {
        let percent = progress::percent(done, total);
        let update = self
            .registry
            .set_progress(self.job_id, percent, Stage::Transform.message())
            .await;
        self.publish_if_changed(update).await;
    }
}
