use std::fmt::Display;

use reface_core::job::{JobError, JobErrorKind};

use crate::stage::Stage;

/// A pipeline fault: which stage raised it, its classification and detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} failed ({kind}): {detail}")]
pub struct PipelineError {
    pub stage: Stage,
    pub kind: JobErrorKind,
    pub detail: String,
}

impl PipelineError {
    pub fn new(stage: Stage, kind: JobErrorKind, detail: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            detail: detail.into(),
        }
    }

    /// Face engine or media toolchain failure.
    pub fn external(stage: Stage, what: &str, err: impl Display) -> Self {
        Self::new(
            stage,
            JobErrorKind::ExternalToolFailure,
            format!("{what} failed: {err}"),
        )
    }

    /// External call exceeded its time bound.
    pub fn timed_out(stage: Stage, what: &str, limit: std::time::Duration) -> Self {
        Self::new(
            stage,
            JobErrorKind::ExternalToolFailure,
            format!("{what} timed out after {}s", limit.as_secs_f64()),
        )
    }

    /// Local filesystem failure.
    pub fn io(stage: Stage, context: &str, err: std::io::Error) -> Self {
        Self::new(stage, JobErrorKind::IoFailure, format!("{context}: {err}"))
    }
}

impl From<PipelineError> for JobError {
    fn from(err: PipelineError) -> Self {
        JobError::new(err.kind, err.detail)
    }
}
