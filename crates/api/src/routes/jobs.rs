use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{jobs, queue};
use crate::state::AppState;

/// Job submission, polling and queue inspection.
///
/// ```text
/// POST   /process                 submit a job
/// GET    /status/{task_id}        job status (+ queue position while queued)
/// GET    /queue                   queued and active jobs
/// GET    /system/status           aggregate counts and host load
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process", post(jobs::submit_job))
        .route("/status/{task_id}", get(jobs::get_task_status))
        .route("/queue", get(queue::get_queue))
        .route("/system/status", get(queue::get_system_status))
}
