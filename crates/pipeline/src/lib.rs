//! Staged frame pipeline for face-swap jobs.
//!
//! [`FramePipeline`] drives one job through prepare, load target, extract,
//! transform, reassemble, restore audio and finalize, against two external
//! collaborators: a [`FaceEngine`] and a [`MediaToolchain`]. Progress is
//! reported through a [`ProgressSink`]; the pipeline itself never touches
//! job records.

pub mod config;
pub mod error;
pub mod face;
pub mod media;
pub mod runner;
pub mod stage;
pub mod workspace;

#[cfg(any(test, feature = "test-support"))]
pub mod fakes;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use face::{select_primary_face, Face, FaceEngine, FaceEngineError, HttpFaceEngine};
pub use media::{FfmpegToolchain, MediaError, MediaToolchain};
pub use runner::{FramePipeline, JobSpec, PipelineOutput, ProgressSink};
pub use stage::Stage;
pub use workspace::Workspace;
