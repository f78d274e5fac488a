//! Job record and its lifecycle state machine.
//!
//! `Queued -> Processing -> {Completed | Failed}`. Every transition goes
//! through a method on [`Job`]; illegal edges are rejected with
//! [`CoreError::Conflict`] and leave the record untouched.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

/// Message shown while a job waits for a worker slot.
pub const MSG_QUEUED: &str = "Waiting in queue";

/// Message recorded on successful completion.
pub const MSG_COMPLETED: &str = "Video processing completed";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// `Completed` and `Failed` are terminal: nothing leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// Stable classification attached to a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// The target image contains no detectable face.
    NoFaceDetected,
    /// Frame extraction produced zero frames.
    EmptySource,
    /// The face engine or media toolchain failed, or timed out.
    ExternalToolFailure,
    /// Local filesystem work (workspace, output directory) failed.
    IoFailure,
    /// The worker crashed or finished without recording an outcome.
    InternalWorkerFault,
}

impl JobErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobErrorKind::NoFaceDetected => "no_face_detected",
            JobErrorKind::EmptySource => "empty_source",
            JobErrorKind::ExternalToolFailure => "external_tool_failure",
            JobErrorKind::IoFailure => "io_failure",
            JobErrorKind::InternalWorkerFault => "internal_worker_fault",
        }
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error recorded on a job that reached `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub detail: String,
}

impl JobError {
    pub fn new(kind: JobErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Raw caller-supplied inputs for a new job.
///
/// Fields may be empty; [`crate::validation::validate_submission`] decides
/// whether the submission is admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSubmission {
    pub source_path: String,
    pub target_face_path: String,
    pub output_path: String,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A single face-swap job.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Percentage in `0.0..=100.0`, never decreasing while processing.
    pub progress: f64,
    pub message: String,
    pub source_path: PathBuf,
    pub target_face_path: PathBuf,
    pub output_path: PathBuf,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub duration_secs: Option<f64>,
    pub error: Option<JobError>,
}

impl Job {
    /// Build a fresh `Queued` job with a new id.
    pub fn queued(submission: &JobSubmission, now: Timestamp) -> Self {
        Self {
            id: JobId::new_v4(),
            status: JobStatus::Queued,
            progress: 0.0,
            message: MSG_QUEUED.to_string(),
            source_path: PathBuf::from(&submission.source_path),
            target_face_path: PathBuf::from(&submission.target_face_path),
            output_path: PathBuf::from(&submission.output_path),
            created_at: now,
            started_at: None,
            ended_at: None,
            duration_secs: None,
            error: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "job {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    fn require_processing(&self) -> Result<(), CoreError> {
        if self.status != JobStatus::Processing {
            return Err(CoreError::Conflict(format!(
                "job {} is {}, not processing",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// `Queued -> Processing`; stamps `started_at`.
    pub fn start(&mut self, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::Processing)?;
        self.started_at = Some(now);
        self.message = "Starting".to_string();
        Ok(())
    }

    /// Record a new progress value and stage message.
    ///
    /// Values are clamped to `0..=100`; a value lower than the current one
    /// keeps the current progress (only the message is updated).
    pub fn record_progress(&mut self, percent: f64, message: &str) -> Result<(), CoreError> {
        self.require_processing()?;
        if percent.is_nan() {
            return Err(CoreError::Validation("progress must be a number".into()));
        }
        self.progress = self.progress.max(percent.clamp(0.0, 100.0));
        self.message = message.to_string();
        Ok(())
    }

    /// Update the stage message without touching progress.
    pub fn set_message(&mut self, message: &str) -> Result<(), CoreError> {
        self.require_processing()?;
        self.message = message.to_string();
        Ok(())
    }

    /// `Processing -> Completed`; progress pinned to 100.
    pub fn complete(&mut self, output_path: PathBuf, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100.0;
        self.message = MSG_COMPLETED.to_string();
        self.output_path = output_path;
        self.stamp_end(now);
        Ok(())
    }

    /// `Processing -> Failed`; progress frozen at its last value.
    pub fn fail(&mut self, error: JobError, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed)?;
        self.message = format!("Error: {}", error.detail);
        self.error = Some(error);
        self.stamp_end(now);
        Ok(())
    }

    fn stamp_end(&mut self, now: Timestamp) {
        self.ended_at = Some(now);
        self.duration_secs = self.started_at.map(|started| {
            let elapsed = now - started;
            elapsed
                .num_nanoseconds()
                .map(|ns| ns as f64 / 1_000_000_000.0)
                .unwrap_or_else(|| elapsed.num_milliseconds() as f64 / 1000.0)
        });
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    use super::*;

    fn submission() -> JobSubmission {
        JobSubmission {
            source_path: "in.mp4".into(),
            target_face_path: "face.jpg".into(),
            output_path: "out.mp4".into(),
        }
    }

    fn processing_job() -> Job {
        let mut job = Job::queued(&submission(), Utc::now());
        job.start(Utc::now()).unwrap();
        job
    }

    #[test]
    fn new_job_is_queued_with_zero_progress() {
        let job = Job::queued(&submission(), Utc::now());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0.0);
        assert!(job.started_at.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn ids_are_unique() {
        let a = Job::queued(&submission(), Utc::now());
        let b = Job::queued(&submission(), Utc::now());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn only_forward_edges_are_legal() {
        use JobStatus::*;
        let all = [Queued, Processing, Completed, Failed];
        let legal = [(Queued, Processing), (Processing, Completed), (Processing, Failed)];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn queued_job_cannot_fail() {
        let mut job = Job::queued(&submission(), Utc::now());
        let err = job
            .fail(JobError::new(JobErrorKind::EmptySource, "x"), Utc::now())
            .unwrap_err();
        assert_matches!(err, CoreError::Conflict(_));
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.error.is_none());
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = processing_job();
        job.record_progress(40.0, "Processing frames").unwrap();
        job.record_progress(20.0, "Processing frames").unwrap();
        assert_eq!(job.progress, 40.0);
        job.record_progress(250.0, "Processing frames").unwrap();
        assert_eq!(job.progress, 100.0);
    }

    #[test]
    fn nan_progress_is_rejected() {
        let mut job = processing_job();
        assert_matches!(
            job.record_progress(f64::NAN, "x"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn progress_requires_processing() {
        let mut job = Job::queued(&submission(), Utc::now());
        assert_matches!(job.record_progress(10.0, "x"), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn complete_pins_progress_and_records_duration() {
        let started = Utc::now();
        let mut job = Job::queued(&submission(), started);
        job.start(started).unwrap();
        job.record_progress(55.0, "Processing frames").unwrap();
        job.complete("out.mp4".into(), started + Duration::milliseconds(1500))
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
        assert_eq!(job.message, MSG_COMPLETED);
        assert!((job.duration_secs.unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn fail_freezes_progress_and_keeps_error() {
        let mut job = processing_job();
        job.record_progress(30.0, "Processing frames").unwrap();
        job.fail(
            JobError::new(JobErrorKind::ExternalToolFailure, "ffmpeg exited with 1"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 30.0);
        assert_eq!(job.message, "Error: ffmpeg exited with 1");
        assert_eq!(
            job.error.as_ref().map(|e| e.kind),
            Some(JobErrorKind::ExternalToolFailure)
        );
        assert!(job.ended_at.is_some());
    }

    #[test]
    fn terminal_job_is_immutable() {
        let mut job = processing_job();
        job.complete("out.mp4".into(), Utc::now()).unwrap();
        let snapshot = job.clone();

        assert!(job
            .fail(JobError::new(JobErrorKind::IoFailure, "late"), Utc::now())
            .is_err());
        assert!(job.record_progress(10.0, "late").is_err());
        assert!(job.set_message("late").is_err());
        assert_eq!(job.status, snapshot.status);
        assert_eq!(job.message, snapshot.message);
        assert!(job.error.is_none());
    }

    #[test]
    fn wire_names() {
        assert_eq!(
            serde_json::to_value(JobStatus::Processing).unwrap(),
            "processing"
        );
        assert_eq!(
            serde_json::to_value(JobErrorKind::NoFaceDetected).unwrap(),
            JobErrorKind::NoFaceDetected.as_str()
        );
    }
}
