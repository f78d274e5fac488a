//! Deterministic in-memory collaborators for tests.
//!
//! Frames are tiny text files (`frame-<n>`); a swap appends `+swapped` and
//! reassembly concatenates frames line by line, so tests can read the output
//! file and see exactly which frames were transformed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::face::{Face, FaceEngine, FaceEngineError};
use crate::media::{MediaError, MediaToolchain};
use crate::runner::ProgressSink;
use crate::stage::Stage;

/// 1-based frame number encoded in a frame file name (`000042.png` -> 42).
fn frame_number(path: &Path) -> Option<usize> {
    path.file_stem()?.to_str()?.parse().ok()
}

fn fake_face(x: f32) -> Face {
    Face {
        bbox: [x, 0.0, x + 64.0, 64.0],
        score: 0.9,
        attributes: Default::default(),
    }
}

// ---------------------------------------------------------------------------
// Face engine
// ---------------------------------------------------------------------------

/// Face engine that finds one face per frame and "swaps" by appending a
/// marker to the frame file.
///
/// Any image whose stem is not a frame number is treated as the target
/// face image.
pub struct FakeFaceEngine {
    target_faces: usize,
    faceless_frames: HashSet<usize>,
    failing_swap_at: Option<usize>,
    delay: Option<Duration>,
    panic_on_target: bool,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeFaceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFaceEngine {
    pub fn new() -> Self {
        Self {
            target_faces: 1,
            faceless_frames: HashSet::new(),
            failing_swap_at: None,
            delay: None,
            panic_on_target: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of faces reported for the target image.
    pub fn with_target_faces(mut self, count: usize) -> Self {
        self.target_faces = count;
        self
    }

    pub fn without_faces_in_frames(mut self, frames: impl IntoIterator<Item = usize>) -> Self {
        self.faceless_frames.extend(frames);
        self
    }

    pub fn failing_swap_at_frame(mut self, frame: usize) -> Self {
        self.failing_swap_at = Some(frame);
        self
    }

    /// Sleep before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Panic while detecting the target face.
    pub fn panicking(mut self) -> Self {
        self.panic_on_target = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl FaceEngine for FakeFaceEngine {
    async fn detect(&self, image: &Path) -> Result<Vec<Face>, FaceEngineError> {
        self.record(format!("detect {}", image.display()));
        self.pause().await;

        match frame_number(image) {
            Some(n) if self.faceless_frames.contains(&n) => Ok(Vec::new()),
            Some(_) => Ok(vec![fake_face(0.0)]),
            None => {
                if self.panic_on_target {
                    panic!("face engine crashed on {}", image.display());
                }
                Ok((0..self.target_faces).map(|i| fake_face(i as f32 * 100.0)).collect())
            }
        }
    }

    async fn swap(
        &self,
        frame: &Path,
        _source_face: &Face,
        _target_face: &Face,
        output: &Path,
    ) -> Result<(), FaceEngineError> {
        self.record(format!("swap {}", frame.display()));
        self.pause().await;

        if frame_number(frame).is_some() && frame_number(frame) == self.failing_swap_at {
            return Err(FaceEngineError::ApiError {
                status: 500,
                body: "inference failed".into(),
            });
        }

        let content = tokio::fs::read_to_string(frame)
            .await
            .map_err(|e| FaceEngineError::Image(e.to_string()))?;
        tokio::fs::write(output, format!("{content}+swapped"))
            .await
            .map_err(|e| FaceEngineError::Image(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Media toolchain
// ---------------------------------------------------------------------------

/// Media toolchain that "decodes" any video into `frames` text frames.
pub struct FakeMediaToolchain {
    frames: usize,
    fps: f64,
    has_video: bool,
    failing: HashSet<&'static str>,
    hanging: HashSet<&'static str>,
    calls: Mutex<Vec<String>>,
}

impl FakeMediaToolchain {
    pub fn new(frames: usize) -> Self {
        Self {
            frames,
            fps: 25.0,
            has_video: true,
            failing: HashSet::new(),
            hanging: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    /// Treat every source as audio-only.
    pub fn without_video_stream(mut self) -> Self {
        self.has_video = false;
        self
    }

    /// Make the named operation (e.g. `"restore_audio"`) return an error.
    pub fn failing_on(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Make the named operation never complete.
    pub fn hanging_on(mut self, operation: &'static str) -> Self {
        self.hanging.insert(operation);
        self
    }

    /// Names of the operations invoked so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, operation: &'static str) -> Result<(), MediaError> {
        self.calls.lock().unwrap().push(operation.to_string());
        if self.hanging.contains(operation) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(operation) {
            return Err(MediaError::Io(std::io::Error::other(format!(
                "{operation} exploded"
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaToolchain for FakeMediaToolchain {
    async fn detect_fps(&self, _video: &Path) -> Result<f64, MediaError> {
        self.enter("detect_fps").await?;
        Ok(self.fps)
    }

    async fn extract_frames(&self, _video: &Path, frames_dir: &Path) -> Result<(), MediaError> {
        self.enter("extract_frames").await?;
        if !self.has_video {
            return Err(MediaError::NoVideoStream);
        }
        tokio::fs::create_dir_all(frames_dir).await?;
        for n in 1..=self.frames {
            tokio::fs::write(frames_dir.join(format!("{n:06}.png")), format!("frame-{n}")).await?;
        }
        Ok(())
    }

    async fn create_video(
        &self,
        frames_dir: &Path,
        _fps: f64,
        output: &Path,
    ) -> Result<(), MediaError> {
        self.enter("create_video").await?;
        let mut entries = tokio::fs::read_dir(frames_dir).await?;
        let mut frames: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            frames.push(entry.path());
        }
        frames.sort();

        let mut video = String::new();
        for frame in frames {
            video.push_str(&tokio::fs::read_to_string(frame).await?);
            video.push('\n');
        }
        tokio::fs::write(output, video).await?;
        Ok(())
    }

    async fn restore_audio(
        &self,
        _source: &Path,
        silent_video: &Path,
        output: &Path,
    ) -> Result<(), MediaError> {
        if self.failing.contains("restore_audio") {
            // Leave a truncated file behind the way a crashed muxer would.
            tokio::fs::write(output, b"partial").await?;
        }
        self.enter("restore_audio").await?;
        tokio::fs::copy(silent_video, output).await?;
        Ok(())
    }

    async fn normalize(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        self.enter("normalize").await?;
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Progress sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    Stage(Stage),
    Frame(usize, usize),
}

/// [`ProgressSink`] that records every callback.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Stage(stage) => Some(stage),
                SinkEvent::Frame(..) => None,
            })
            .collect()
    }

    pub fn frames(&self) -> Vec<(usize, usize)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Frame(done, total) => Some((done, total)),
                SinkEvent::Stage(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn stage_started(&self, stage: Stage) {
        self.events.lock().unwrap().push(SinkEvent::Stage(stage));
    }

    async fn frame_processed(&self, done: usize, total: usize) {
        self.events.lock().unwrap().push(SinkEvent::Frame(done, total));
    }
}
