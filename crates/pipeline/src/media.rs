//! Media toolchain seam and its ffmpeg-backed implementation.

use std::path::Path;

use async_trait::async_trait;
use reface_core::ffmpeg::{self, FfmpegError, FfmpegTools};

/// Frame rate used when the probe cannot determine one.
pub const FALLBACK_FPS: f64 = 30.0;

/// Errors from the media toolchain layer.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source has no video stream")]
    NoVideoStream,

    #[error("no frames could be decoded: {0}")]
    NoFrames(String),
}

impl MediaError {
    /// The source itself yields no frames, as opposed to a tool failure.
    pub fn is_empty_source(&self) -> bool {
        matches!(self, Self::NoVideoStream | Self::NoFrames(_))
    }
}

/// Video decomposition and reassembly capability.
#[async_trait]
pub trait MediaToolchain: Send + Sync {
    /// Frame rate of `video`; non-positive when unknown.
    async fn detect_fps(&self, video: &Path) -> Result<f64, MediaError>;

    /// Write the frames of `video` into `frames_dir`, each named by its
    /// 1-based frame number (`000001.png`, ...).
    ///
    /// A source without decodable video is [`MediaError::NoVideoStream`] or
    /// [`MediaError::NoFrames`].
    async fn extract_frames(&self, video: &Path, frames_dir: &Path) -> Result<(), MediaError>;

    /// Encode the frames in `frames_dir` at `fps` into a silent `output`.
    async fn create_video(&self, frames_dir: &Path, fps: f64, output: &Path)
        -> Result<(), MediaError>;

    /// Put the audio of `source` onto `silent_video`, writing `output`.
    async fn restore_audio(
        &self,
        source: &Path,
        silent_video: &Path,
        output: &Path,
    ) -> Result<(), MediaError>;

    /// Convert an arbitrary container into a normalized MP4.
    async fn normalize(&self, input: &Path, output: &Path) -> Result<(), MediaError>;
}

/// [`MediaToolchain`] that shells out to `ffmpeg` / `ffprobe`.
pub struct FfmpegToolchain {
    tools: FfmpegTools,
}

impl FfmpegToolchain {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }
}

async fn is_empty_dir(dir: &Path) -> std::io::Result<bool> {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl MediaToolchain for FfmpegToolchain {
    async fn detect_fps(&self, video: &Path) -> Result<f64, MediaError> {
        let probe = self.tools.probe_video(video).await?;
        Ok(ffmpeg::parse_framerate(&probe))
    }

    async fn extract_frames(&self, video: &Path, frames_dir: &Path) -> Result<(), MediaError> {
        let probe = self.tools.probe_video(video).await?;
        if !ffmpeg::has_video_stream(&probe) {
            return Err(MediaError::NoVideoStream);
        }

        match self.tools.extract_frames(video, frames_dir).await {
            Ok(()) => Ok(()),
            Err(FfmpegError::ExecutionFailed { stderr, .. }) if is_empty_dir(frames_dir).await? => {
                Err(MediaError::NoFrames(stderr))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_video(
        &self,
        frames_dir: &Path,
        fps: f64,
        output: &Path,
    ) -> Result<(), MediaError> {
        Ok(self.tools.encode_frames(frames_dir, fps, output).await?)
    }

    async fn restore_audio(
        &self,
        source: &Path,
        silent_video: &Path,
        output: &Path,
    ) -> Result<(), MediaError> {
        let probe = self.tools.probe_video(source).await?;
        if !ffmpeg::has_audio_stream(&probe) {
            tracing::debug!(source = %source.display(), "Source has no audio, keeping silent video");
            tokio::fs::copy(silent_video, output).await?;
            return Ok(());
        }
        Ok(self.tools.mux_audio(silent_video, source, output).await?)
    }

    async fn normalize(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        Ok(self.tools.normalize_video(input, output).await?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    use assert_matches::assert_matches;

    use super::*;

    const VIDEO_PROBE: &str =
        r#"{"streams":[{"codec_type":"video","r_frame_rate":"25/1"},{"codec_type":"audio"}]}"#;
    const AUDIO_ONLY_PROBE: &str = r#"{"streams":[{"codec_type":"audio"}]}"#;

    /// Scratch dir with a source file and stand-in ffmpeg/ffprobe scripts.
    struct Tools {
        dir: tempfile::TempDir,
    }

    impl Tools {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("in.mp4"), b"video").unwrap();
            Self { dir }
        }

        fn script(&self, name: &str, body: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn toolchain(&self, probe_json: &str, ffmpeg_body: &str) -> FfmpegToolchain {
            FfmpegToolchain::new(FfmpegTools {
                ffprobe: self.script("ffprobe", &format!("echo '{probe_json}'")),
                ffmpeg: self.script("ffmpeg", ffmpeg_body),
                ..FfmpegTools::default()
            })
        }

        fn source(&self) -> PathBuf {
            self.dir.path().join("in.mp4")
        }

        fn frames_dir(&self) -> PathBuf {
            self.dir.path().join("frames")
        }
    }

    #[tokio::test]
    async fn audio_only_source_has_no_video_stream() {
        let tools = Tools::new();
        let media = tools.toolchain(AUDIO_ONLY_PROBE, "exit 0");

        let err = media
            .extract_frames(&tools.source(), &tools.frames_dir())
            .await
            .unwrap_err();
        assert_matches!(err, MediaError::NoVideoStream);
        assert!(err.is_empty_source());
    }

    #[tokio::test]
    async fn failed_decode_without_frames_is_empty_source() {
        let tools = Tools::new();
        let media = tools.toolchain(
            VIDEO_PROBE,
            "echo 'Output file does not contain any stream' >&2; exit 1",
        );

        let err = media
            .extract_frames(&tools.source(), &tools.frames_dir())
            .await
            .unwrap_err();
        assert_matches!(&err, MediaError::NoFrames(stderr) if stderr.contains("any stream"));
        assert!(err.is_empty_source());
    }

    #[tokio::test]
    async fn failure_after_writing_frames_is_a_tool_failure() {
        let tools = Tools::new();
        let frames = tools.frames_dir();
        let media = tools.toolchain(
            VIDEO_PROBE,
            &format!("touch '{}/000001.png'; exit 1", frames.display()),
        );

        let err = media.extract_frames(&tools.source(), &frames).await.unwrap_err();
        assert_matches!(err, MediaError::Ffmpeg(FfmpegError::ExecutionFailed { .. }));
        assert!(!err.is_empty_source());
    }

    #[tokio::test]
    async fn frame_rate_comes_from_ffprobe() {
        let tools = Tools::new();
        let media = tools.toolchain(VIDEO_PROBE, "exit 0");
        assert_eq!(media.detect_fps(&tools.source()).await.unwrap(), 25.0);
    }
}
