//! Task registry: the authoritative store of job records.
//!
//! All state transitions and progress writes go through [`TaskRegistry`];
//! the transition rules themselves live on [`Job`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use reface_core::error::CoreError;
use reface_core::job::{Job, JobError};
use reface_core::types::JobId;
use reface_core::validation::ValidSubmission;
use tokio::sync::RwLock;

/// Store of job records keyed by id.
///
/// Every mutating method returns the record as it is after the write, so
/// callers can publish it without a second lookup.
#[async_trait]
pub trait TaskRegistry: Send + Sync {
    /// Insert a new `Queued` record.
    ///
    /// Takes a [`ValidSubmission`] so no filesystem checks happen while the
    /// caller holds the queue lock.
    async fn create_job(&self, submission: &ValidSubmission) -> Result<Job, CoreError>;

    async fn get(&self, id: JobId) -> Option<Job>;

    /// `Queued -> Processing`.
    async fn set_processing(&self, id: JobId) -> Result<Job, CoreError>;

    /// Record progress (ignored if lower than the current value) and message.
    async fn set_progress(&self, id: JobId, percent: f64, message: &str)
        -> Result<Job, CoreError>;

    async fn set_message(&self, id: JobId, message: &str) -> Result<Job, CoreError>;

    /// `Processing -> Completed`.
    async fn set_completed(&self, id: JobId, output_path: PathBuf) -> Result<Job, CoreError>;

    /// `Processing -> Failed`.
    async fn set_failed(&self, id: JobId, error: JobError) -> Result<Job, CoreError>;

    /// Every record, in creation order.
    async fn snapshot_all(&self) -> Vec<Job>;
}

/// Process-local [`TaskRegistry`].
///
/// The index lock is only held to look up or insert an entry; each record
/// has its own lock, so a status poll on one job never waits behind a
/// progress write on another.
#[derive(Default)]
pub struct InMemoryRegistry {
    jobs: RwLock<IndexMap<JobId, Arc<RwLock<Job>>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, id: JobId) -> Result<Arc<RwLock<Job>>, CoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound {
                entity: "Task",
                id: id.to_string(),
            })
    }

    /// Apply `change` to one record under its write lock.
    ///
    /// `Job` methods validate before mutating, so a rejected change leaves
    /// the record as it was.
    async fn update<F>(&self, id: JobId, change: F) -> Result<Job, CoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), CoreError> + Send,
    {
        let entry = self.entry(id).await?;
        let mut job = entry.write().await;
        change(&mut *job)?;
        Ok(job.clone())
    }
}

#[async_trait]
impl TaskRegistry for InMemoryRegistry {
    async fn create_job(&self, submission: &ValidSubmission) -> Result<Job, CoreError> {
        let mut jobs = self.jobs.write().await;
        let mut job = Job::queued(submission, chrono::Utc::now());
        while jobs.contains_key(&job.id) {
            job.id = JobId::new_v4();
        }
        jobs.insert(job.id, Arc::new(RwLock::new(job.clone())));
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Option<Job> {
        let entry = self.entry(id).await.ok()?;
        let job = entry.read().await.clone();
        Some(job)
    }

    async fn set_processing(&self, id: JobId) -> Result<Job, CoreError> {
        self.update(id, |job| job.start(chrono::Utc::now())).await
    }

    async fn set_progress(
        &self,
        id: JobId,
        percent: f64,
        message: &str,
    ) -> Result<Job, CoreError> {
        self.update(id, |job| job.record_progress(percent, message))
            .await
    }

    async fn set_message(&self, id: JobId, message: &str) -> Result<Job, CoreError> {
        self.update(id, |job| job.set_message(message)).await
    }

    async fn set_completed(&self, id: JobId, output_path: PathBuf) -> Result<Job, CoreError> {
        self.update(id, |job| job.complete(output_path, chrono::Utc::now()))
            .await
    }

    async fn set_failed(&self, id: JobId, error: JobError) -> Result<Job, CoreError> {
        self.update(id, |job| job.fail(error, chrono::Utc::now()))
            .await
    }

    async fn snapshot_all(&self) -> Vec<Job> {
        let entries: Vec<_> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            jobs.push(entry.read().await.clone());
        }
        jobs
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use reface_core::job::{JobErrorKind, JobStatus, JobSubmission};
    use reface_core::validation::validate_submission;

    use super::*;

    fn submission(dir: &std::path::Path) -> ValidSubmission {
        std::fs::write(dir.join("in.mp4"), b"v").unwrap();
        std::fs::write(dir.join("face.png"), b"i").unwrap();
        validate_submission(JobSubmission {
            source_path: dir.join("in.mp4").to_string_lossy().into_owned(),
            target_face_path: dir.join("face.png").to_string_lossy().into_owned(),
            output_path: dir.join("out.mp4").to_string_lossy().into_owned(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn created_record_is_queued_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InMemoryRegistry::new();
        let job = registry.create_job(&submission(dir.path())).await.unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0.0);
        assert_eq!(registry.get(job.id).await.unwrap().id, job.id);
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InMemoryRegistry::new();
        let job = registry.create_job(&submission(dir.path())).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        registry.set_processing(job.id).await.unwrap();
        registry.set_progress(job.id, 40.0, "Processing frames").await.unwrap();
        let after_regress = registry.set_progress(job.id, 20.0, "Processing frames").await.unwrap();
        assert_eq!(after_regress.progress, 40.0);

        let done = registry
            .set_completed(job.id, PathBuf::from("/out.mp4"))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100.0);
        assert!(done.duration_secs.is_some());
    }

    #[tokio::test]
    async fn terminal_record_rejects_further_writes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InMemoryRegistry::new();
        let job = registry.create_job(&submission(dir.path())).await.unwrap();
        registry.set_processing(job.id).await.unwrap();
        registry
            .set_failed(job.id, JobError::new(JobErrorKind::EmptySource, "no frames"))
            .await
            .unwrap();

        let before = registry.get(job.id).await.unwrap();
        assert_matches!(
            registry.set_progress(job.id, 90.0, "late").await,
            Err(CoreError::Conflict(_))
        );
        assert_matches!(
            registry.set_completed(job.id, PathBuf::from("x")).await,
            Err(CoreError::Conflict(_))
        );
        let after = registry.get(job.id).await.unwrap();
        assert_eq!(before.message, after.message);
        assert_eq!(after.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let registry = InMemoryRegistry::new();
        assert!(registry.get(JobId::new_v4()).await.is_none());
        assert_matches!(
            registry.set_processing(JobId::new_v4()).await,
            Err(CoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn snapshot_is_in_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InMemoryRegistry::new();
        let sub = submission(dir.path());
        let a = registry.create_job(&sub).await.unwrap();
        let b = registry.create_job(&sub).await.unwrap();
        let c = registry.create_job(&sub).await.unwrap();

        let ids: Vec<_> = registry.snapshot_all().await.iter().map(|j| j.id).collect();
        assert_eq!(ids, [a.id, b.id, c.id]);
    }
}
