//! Domain types shared by the pipeline and the API server: the job record
//! and its state machine, submission validation, ffmpeg/ffprobe helpers and
//! progress rendering.

pub mod error;
pub mod ffmpeg;
pub mod job;
pub mod job_events;
pub mod progress;
pub mod types;
pub mod validation;
