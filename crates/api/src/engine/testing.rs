//! Registry double that fails selected writes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use reface_core::error::CoreError;
use reface_core::job::{Job, JobError};
use reface_core::types::JobId;
use reface_core::validation::ValidSubmission;

use crate::engine::registry::{InMemoryRegistry, TaskRegistry};

/// [`InMemoryRegistry`] whose `set_processing` fails a set number of times
/// and whose `set_completed` can be made to always fail.
#[derive(Default)]
pub struct FlakyRegistry {
    inner: InMemoryRegistry,
    processing_failures: AtomicUsize,
    reject_completion: AtomicBool,
}

impl FlakyRegistry {
    pub fn failing_processing(times: usize) -> Self {
        Self {
            processing_failures: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    pub fn rejecting_completion() -> Self {
        Self {
            reject_completion: AtomicBool::new(true),
            ..Self::default()
        }
    }

    fn unavailable() -> CoreError {
        CoreError::Internal("registry unavailable".to_string())
    }
}

#[async_trait]
impl TaskRegistry for FlakyRegistry {
    async fn create_job(&self, submission: &ValidSubmission) -> Result<Job, CoreError> {
        self.inner.create_job(submission).await
    }

    async fn get(&self, id: JobId) -> Option<Job> {
        self.inner.get(id).await
    }

    async fn set_processing(&self, id: JobId) -> Result<Job, CoreError> {
        let fail = self
            .processing_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(Self::unavailable());
        }
        self.inner.set_processing(id).await
    }

    async fn set_progress(
        &self,
        id: JobId,
        percent: f64,
        message: &str,
    ) -> Result<Job, CoreError> {
        self.inner.set_progress(id, percent, message).await
    }

    async fn set_message(&self, id: JobId, message: &str) -> Result<Job, CoreError> {
        self.inner.set_message(id, message).await
    }

    async fn set_completed(&self, id: JobId, output_path: PathBuf) -> Result<Job, CoreError> {
        if self.reject_completion.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.set_completed(id, output_path).await
    }

    async fn set_failed(&self, id: JobId, error: JobError) -> Result<Job, CoreError> {
        self.inner.set_failed(id, error).await
    }

    async fn snapshot_all(&self) -> Vec<Job> {
        self.inner.snapshot_all().await
    }
}
