//! Handlers for queue inspection and aggregate system status.

use axum::extract::State;
use axum::Json;
use reface_core::job::Job;
use reface_core::progress::display_percent;
use reface_core::types::{JobId, Timestamp};
use serde::Serialize;

use crate::state::AppState;
use crate::system;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// A waiting job as listed by GET /queue.
#[derive(Debug, Serialize)]
pub struct QueuedTask {
    pub task_id: JobId,
    /// File name of the source video.
    pub source: String,
    pub created_at: Timestamp,
}

/// A running job as listed by GET /queue.
#[derive(Debug, Serialize)]
pub struct ActiveTask {
    pub task_id: JobId,
    pub progress: f64,
    pub message: String,
    pub start_time: Option<Timestamp>,
}

/// Response for GET /queue.
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub queue_size: usize,
    pub active_tasks: usize,
    pub queued_tasks: Vec<QueuedTask>,
    pub active_task_details: Vec<ActiveTask>,
}

/// Response for GET /system/status.
#[derive(Debug, Serialize)]
pub struct SystemStatusResponse {
    pub timestamp: Timestamp,
    pub total_tasks: usize,
    pub queued_tasks: usize,
    pub active_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub max_workers: usize,
    /// 1/5/15 minute load average; `null` where the platform has none.
    pub system_load: Option<[f64; 3]>,
}

impl From<&Job> for QueuedTask {
    fn from(job: &Job) -> Self {
        Self {
            task_id: job.id,
            source: job
                .source_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            created_at: job.created_at,
        }
    }
}

impl From<&Job> for ActiveTask {
    fn from(job: &Job) -> Self {
        Self {
            task_id: job.id,
            progress: display_percent(job.progress),
            message: job.message.clone(),
            start_time: job.started_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /queue
///
/// Waiting jobs head first, plus the jobs currently being processed.
pub async fn get_queue(State(state): State<AppState>) -> Json<QueueResponse> {
    let overview = state.engine.queue_overview().await;

    Json(QueueResponse {
        queue_size: overview.queued.len(),
        active_tasks: overview.active.len(),
        queued_tasks: overview.queued.iter().map(QueuedTask::from).collect(),
        active_task_details: overview.active.iter().map(ActiveTask::from).collect(),
    })
}

/// GET /system/status
pub async fn get_system_status(State(state): State<AppState>) -> Json<SystemStatusResponse> {
    let counts = state.engine.counts().await;

    Json(SystemStatusResponse {
        timestamp: chrono::Utc::now(),
        total_tasks: counts.total,
        queued_tasks: counts.queued,
        active_tasks: counts.active,
        completed_tasks: counts.completed,
        failed_tasks: counts.failed,
        max_workers: state.config.engine.max_workers,
        system_load: system::load_average(),
    })
}
