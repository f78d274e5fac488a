//! Handlers for job submission and status polling.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use reface_core::error::CoreError;
use reface_core::job::{Job, JobError, JobStatus, JobSubmission};
use reface_core::progress::display_percent;
use reface_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for POST /process.
///
/// Missing fields deserialize as empty and are rejected by validation with
/// a per-field message.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProcessRequest {
    pub source_path: String,
    pub output_path: String,
    pub target_face_path: String,
}

impl From<ProcessRequest> for JobSubmission {
    fn from(req: ProcessRequest) -> Self {
        Self {
            source_path: req.source_path,
            target_face_path: req.target_face_path,
            output_path: req.output_path,
        }
    }
}

/// Response for POST /process.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub task_id: JobId,
    pub status: JobStatus,
    pub queue_position: usize,
    pub timestamp: Timestamp,
}

/// Response for GET /status/{task_id}.
#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub status: JobStatus,
    /// Percentage rounded to one decimal.
    pub progress: f64,
    pub message: String,
    pub output_path: String,
    pub created_at: Timestamp,
    pub start_time: Option<Timestamp>,
    /// Seconds between start and end, once terminal.
    pub duration: Option<f64>,
    pub end_time: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl TaskStatusResponse {
    fn new(job: Job, queue_position: Option<usize>) -> Self {
        Self {
            status: job.status,
            progress: display_percent(job.progress),
            message: job.message,
            output_path: job.output_path.to_string_lossy().into_owned(),
            created_at: job.created_at,
            start_time: job.started_at,
            duration: job.duration_secs,
            end_time: job.ended_at,
            queue_position,
            error: job.error,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /process
///
/// Validates the submission synchronously, registers it and enqueues it.
/// Returns 201 with the new task id and its queue position.
pub async fn submit_job(
    State(state): State<AppState>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = body.map_err(|e| CoreError::Validation(e.body_text()))?;
    let submission = JobSubmission::from(req);

    let admission = state.engine.submit(&submission).await?;

    let resp = ProcessResponse {
        task_id: admission.job.id,
        status: admission.job.status,
        queue_position: admission.queue_position,
        timestamp: chrono::Utc::now(),
    };
    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /status/{task_id}
///
/// A malformed id is reported the same way as an unknown one.
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<TaskStatusResponse>> {
    let id: JobId = task_id.parse().map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "Task",
            id: task_id.clone(),
        })
    })?;

    let view = state.engine.status(id).await?;
    Ok(Json(TaskStatusResponse::new(view.job, view.queue_position)))
}
