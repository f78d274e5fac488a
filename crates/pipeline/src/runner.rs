//! Stage-by-stage execution of one job.

use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reface_core::job::{Job, JobErrorKind};
use reface_core::types::JobId;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::face::{select_primary_face, Face, FaceEngine};
use crate::media::{MediaToolchain, FALLBACK_FPS};
use crate::stage::Stage;
use crate::workspace::Workspace;

/// Inputs of one pipeline run.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: JobId,
    pub source_path: PathBuf,
    pub target_face_path: PathBuf,
    pub output_path: PathBuf,
}

impl From<&Job> for JobSpec {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            source_path: job.source_path.clone(),
            target_face_path: job.target_face_path.clone(),
            output_path: job.output_path.clone(),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub output_path: PathBuf,
    pub total_frames: usize,
    /// Frames in which a face was found and swapped.
    pub swapped_frames: usize,
    pub fps: f64,
}

/// Receives stage boundaries and per-frame progress.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn stage_started(&self, stage: Stage);

    /// Called after each transformed frame with `done` in `1..=total`.
    async fn frame_processed(&self, done: usize, total: usize);
}

/// Await `fut` for at most `limit`; errors and timeouts become
/// [`JobErrorKind::ExternalToolFailure`].
async fn bounded<T, E, F>(stage: Stage, what: &str, limit: Duration, fut: F) -> Result<T, PipelineError>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(PipelineError::external(stage, what, e)),
        Err(_elapsed) => Err(PipelineError::timed_out(stage, what, limit)),
    }
}

/// The frame pipeline. Stateless across runs; one instance serves every
/// worker.
pub struct FramePipeline {
    faces: Arc<dyn FaceEngine>,
    media: Arc<dyn MediaToolchain>,
    config: PipelineConfig,
}

impl FramePipeline {
    pub fn new(
        faces: Arc<dyn FaceEngine>,
        media: Arc<dyn MediaToolchain>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            faces,
            media,
            config,
        }
    }

    /// Run every stage for `spec`.
    ///
    /// The workspace is released on every exit path. On failure a partially
    /// written output file is removed.
    pub async fn run(
        &self,
        spec: &JobSpec,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineOutput, PipelineError> {
        progress.stage_started(Stage::Prepare).await;
        let workspace = Workspace::prepare(&self.config.temp_root, &spec.source_path, spec.job_id)
            .await
            .map_err(|e| PipelineError::io(Stage::Prepare, "creating workspace", e))?;
        tracing::debug!(
            job_id = %spec.job_id,
            workspace = %workspace.path().display(),
            "Workspace prepared",
        );

        let result = self.run_stages(spec, &workspace, progress).await;

        match &result {
            Ok(_) => progress.stage_started(Stage::Finalize).await,
            Err(err) if err.stage == Stage::RestoreAudio => {
                discard_partial_output(&spec.output_path).await;
            }
            Err(_) => {}
        }

        if let Err(e) = workspace.release().await {
            tracing::warn!(job_id = %spec.job_id, error = %e, "Failed to release workspace");
        }

        result
    }

    async fn run_stages(
        &self,
        spec: &JobSpec,
        workspace: &Workspace,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineOutput, PipelineError> {
        let target_face = self.load_target(spec, progress).await?;
        let frames = self.extract(spec, workspace, progress).await?;
        let swapped_frames = self.transform(spec, &frames, &target_face, progress).await?;
        let fps = self.reassemble(spec, workspace, progress).await?;
        self.restore_audio(spec, workspace, progress).await?;

        Ok(PipelineOutput {
            output_path: spec.output_path.clone(),
            total_frames: frames.len(),
            swapped_frames,
            fps,
        })
    }

    async fn load_target(
        &self,
        spec: &JobSpec,
        progress: &dyn ProgressSink,
    ) -> Result<Face, PipelineError> {
        const STAGE: Stage = Stage::LoadTarget;
        progress.stage_started(STAGE).await;

        let faces = bounded(
            STAGE,
            "target face detection",
            self.config.face_call_timeout,
            self.faces.detect(&spec.target_face_path),
        )
        .await?;

        let detected = faces.len();
        let face = select_primary_face(faces).ok_or_else(|| {
            PipelineError::new(
                STAGE,
                JobErrorKind::NoFaceDetected,
                "No faces detected in target image",
            )
        })?;
        tracing::info!(job_id = %spec.job_id, detected, "Target face loaded");
        Ok(face)
    }

    async fn extract(
        &self,
        spec: &JobSpec,
        workspace: &Workspace,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        const STAGE: Stage = Stage::Extract;
        progress.stage_started(STAGE).await;

        let limit = self.config.media_call_timeout;
        let source = if self.config.normalize_source {
            let normalized = workspace.normalized_source();
            bounded(
                STAGE,
                "source normalization",
                limit,
                self.media.normalize(&spec.source_path, &normalized),
            )
            .await?;
            normalized
        } else {
            spec.source_path.clone()
        };

        let extracted =
            tokio::time::timeout(limit, self.media.extract_frames(&source, &workspace.frames_dir()))
                .await;
        match extracted {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_empty_source() => {
                return Err(PipelineError::new(
                    STAGE,
                    JobErrorKind::EmptySource,
                    format!("No frames extracted from video: {e}"),
                ));
            }
            Ok(Err(e)) => return Err(PipelineError::external(STAGE, "frame extraction", e)),
            Err(_elapsed) => return Err(PipelineError::timed_out(STAGE, "frame extraction", limit)),
        }

        let frames = workspace
            .frame_paths()
            .await
            .map_err(|e| PipelineError::io(STAGE, "listing frames", e))?;
        if frames.is_empty() {
            return Err(PipelineError::new(
                STAGE,
                JobErrorKind::EmptySource,
                "No frames extracted from video",
            ));
        }

        tracing::info!(job_id = %spec.job_id, total_frames = frames.len(), "Frames extracted");
        Ok(frames)
    }

    /// Swap faces frame by frame. Frames without a detected face are kept
    /// unchanged.
    async fn transform(
        &self,
        spec: &JobSpec,
        frames: &[PathBuf],
        target_face: &Face,
        progress: &dyn ProgressSink,
    ) -> Result<usize, PipelineError> {
        const STAGE: Stage = Stage::Transform;
        progress.stage_started(STAGE).await;

        let limit = self.config.face_call_timeout;
        let total = frames.len();
        let mut swapped = 0;

        for (index, frame) in frames.iter().enumerate() {
            let faces = bounded(STAGE, "frame face detection", limit, self.faces.detect(frame))
                .await?;

            match select_primary_face(faces) {
                Some(source_face) => {
                    bounded(
                        STAGE,
                        "face swap",
                        limit,
                        self.faces.swap(frame, &source_face, target_face, frame),
                    )
                    .await?;
                    swapped += 1;
                }
                None => {
                    tracing::trace!(job_id = %spec.job_id, frame = index + 1, "No face in frame");
                }
            }

            progress.frame_processed(index + 1, total).await;
        }

        tracing::info!(job_id = %spec.job_id, total, swapped, "Frames transformed");
        Ok(swapped)
    }

    async fn reassemble(
        &self,
        spec: &JobSpec,
        workspace: &Workspace,
        progress: &dyn ProgressSink,
    ) -> Result<f64, PipelineError> {
        const STAGE: Stage = Stage::Reassemble;
        progress.stage_started(STAGE).await;

        let limit = self.config.media_call_timeout;
        let detected = bounded(
            STAGE,
            "frame rate detection",
            limit,
            self.media.detect_fps(&spec.source_path),
        )
        .await?;
        let fps = if detected.is_finite() && detected > 0.0 {
            detected
        } else {
            tracing::warn!(job_id = %spec.job_id, detected, "Unknown frame rate, using fallback");
            FALLBACK_FPS
        };

        bounded(
            STAGE,
            "video reassembly",
            limit,
            self.media
                .create_video(&workspace.frames_dir(), fps, &workspace.silent_video()),
        )
        .await?;

        tracing::info!(job_id = %spec.job_id, fps, "Video reassembled");
        Ok(fps)
    }

    async fn restore_audio(
        &self,
        spec: &JobSpec,
        workspace: &Workspace,
        progress: &dyn ProgressSink,
    ) -> Result<(), PipelineError> {
        const STAGE: Stage = Stage::RestoreAudio;
        progress.stage_started(STAGE).await;

        if let Some(parent) = spec.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::io(STAGE, "creating output directory", e))?;
        }

        bounded(
            STAGE,
            "audio restoration",
            self.config.media_call_timeout,
            self.media.restore_audio(
                &spec.source_path,
                &workspace.silent_video(),
                &spec.output_path,
            ),
        )
        .await?;

        if !tokio::fs::try_exists(&spec.output_path).await.unwrap_or(false) {
            return Err(PipelineError::new(
                STAGE,
                JobErrorKind::ExternalToolFailure,
                "audio restoration reported success but wrote no output",
            ));
        }

        tracing::info!(job_id = %spec.job_id, output = %spec.output_path.display(), "Output written");
        Ok(())
    }
}

async fn discard_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output"),
    }
}
