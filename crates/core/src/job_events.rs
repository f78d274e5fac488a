//! WebSocket message type constants for job lifecycle events.
//!
//! Used by the API's worker progress sink and submission handler when
//! broadcasting to connected WebSocket clients.

/// Job admitted into the intake queue.
pub const MSG_TYPE_JOB_QUEUED: &str = "job_queued";

/// Job picked up by a worker (`queued -> processing`).
pub const MSG_TYPE_JOB_STARTED: &str = "job_started";

/// Stage change or displayed progress change during execution.
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Job completed successfully.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed with an error.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";
