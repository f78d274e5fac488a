//! FFmpeg/FFprobe command utilities.
//!
//! Thin async wrappers over the `ffmpeg` and `ffprobe` binaries used by the
//! frame pipeline: probing, frame extraction, re-encoding a frame sequence,
//! audio remux and container normalization. Every child process is spawned
//! with `kill_on_drop(true)` so that dropping the future (for instance when
//! an outer timeout fires) kills the process instead of leaking it.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

/// Maximum number of stderr bytes kept in an error.
const MAX_STDERR_BYTES: usize = 4 * 1024;

/// Frame file name pattern inside a frames directory.
pub const FRAME_PATTERN: &str = "%06d.png";

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

/// Locations of the binaries and the encoder settings used for output.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// Video encoder passed to `-c:v` (default `libx264`).
    pub encoder: String,
    /// Constant rate factor passed to `-crf` (default 18).
    pub crf: u8,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            encoder: "libx264".to_string(),
            crf: 18,
        }
    }
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    pub streams: Vec<FfprobeStream>,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
}

// ---------------------------------------------------------------------------
// Process runner
// ---------------------------------------------------------------------------

/// Run `program` with `args`, returning stdout on success.
async fn run_tool<I, S>(program: &Path, args: I) -> Result<Vec<u8>, FfmpegError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FfmpegError::NotFound(e),
            _ => FfmpegError::IoError(e),
        })?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    Ok(output.stdout)
}

/// Keep the last [`MAX_STDERR_BYTES`] of stderr, where ffmpeg puts the cause.
fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(MAX_STDERR_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

fn ensure_exists(path: &Path) -> Result<(), FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::VideoNotFound(
            path.to_string_lossy().to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl FfmpegTools {
    /// Run `ffprobe` on a video file and return the parsed JSON output.
    pub async fn probe_video(&self, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
        ensure_exists(path)?;

        let mut args: Vec<&OsStr> = [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
        ]
        .into_iter()
        .map(OsStr::new)
        .collect();
        args.push(path.as_os_str());

        let stdout = run_tool(&self.ffprobe, args).await?;
        let stdout = String::from_utf8_lossy(&stdout);
        serde_json::from_str::<FfprobeOutput>(&stdout)
            .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
    }

    /// Decompose `video` into numbered PNG frames inside `frames_dir`.
    pub async fn extract_frames(&self, video: &Path, frames_dir: &Path) -> Result<(), FfmpegError> {
        ensure_exists(video)?;
        tokio::fs::create_dir_all(frames_dir).await?;

        let pattern = frames_dir.join(FRAME_PATTERN);
        let args: Vec<&OsStr> = vec![
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"),
            OsStr::new("error"),
            OsStr::new("-i"),
            video.as_os_str(),
            OsStr::new("-pix_fmt"),
            OsStr::new("rgb24"),
            pattern.as_os_str(),
        ];
        run_tool(&self.ffmpeg, args).await.map(|_| ())
    }

    /// Encode the numbered frames in `frames_dir` at `fps` into `output`
    /// (video only).
    pub async fn encode_frames(
        &self,
        frames_dir: &Path,
        fps: f64,
        output: &Path,
    ) -> Result<(), FfmpegError> {
        let pattern = frames_dir.join(FRAME_PATTERN);
        let fps = format!("{fps:.3}");
        let crf = self.crf.to_string();
        let args: Vec<&OsStr> = vec![
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"),
            OsStr::new("error"),
            OsStr::new("-r"),
            OsStr::new(&fps),
            OsStr::new("-i"),
            pattern.as_os_str(),
            OsStr::new("-c:v"),
            OsStr::new(&self.encoder),
            OsStr::new("-crf"),
            OsStr::new(&crf),
            OsStr::new("-pix_fmt"),
            OsStr::new("yuv420p"),
            OsStr::new("-y"),
            output.as_os_str(),
        ];
        run_tool(&self.ffmpeg, args).await.map(|_| ())
    }

    /// Copy the video stream of `video` and the first audio stream of
    /// `audio_source` into `output`.
    pub async fn mux_audio(
        &self,
        video: &Path,
        audio_source: &Path,
        output: &Path,
    ) -> Result<(), FfmpegError> {
        ensure_exists(video)?;
        ensure_exists(audio_source)?;

        let args: Vec<&OsStr> = vec![
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"),
            OsStr::new("error"),
            OsStr::new("-i"),
            video.as_os_str(),
            OsStr::new("-i"),
            audio_source.as_os_str(),
            OsStr::new("-c:v"),
            OsStr::new("copy"),
            OsStr::new("-map"),
            OsStr::new("0:v:0"),
            OsStr::new("-map"),
            OsStr::new("1:a:0"),
            OsStr::new("-shortest"),
            OsStr::new("-y"),
            output.as_os_str(),
        ];
        run_tool(&self.ffmpeg, args).await.map(|_| ())
    }

    /// Re-encode an arbitrary container into H.264/AAC MP4.
    pub async fn normalize_video(&self, input: &Path, output: &Path) -> Result<(), FfmpegError> {
        ensure_exists(input)?;

        let crf = self.crf.to_string();
        let args: Vec<&OsStr> = vec![
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"),
            OsStr::new("error"),
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-c:v"),
            OsStr::new(&self.encoder),
            OsStr::new("-crf"),
            OsStr::new(&crf),
            OsStr::new("-pix_fmt"),
            OsStr::new("yuv420p"),
            OsStr::new("-c:a"),
            OsStr::new("aac"),
            OsStr::new("-movflags"),
            OsStr::new("+faststart"),
            OsStr::new("-y"),
            output.as_os_str(),
        ];
        run_tool(&self.ffmpeg, args).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first video stream in the ffprobe output.
fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Parse the video framerate from ffprobe output.
///
/// Prefers `r_frame_rate`, falling back to `avg_frame_rate`. Both are
/// fractions like `"30/1"` or `"24000/1001"`. Returns 0 when unknown.
pub fn parse_framerate(probe: &FfprobeOutput) -> f64 {
    let Some(stream) = first_video_stream(probe) else {
        return 0.0;
    };
    [stream.r_frame_rate.as_deref(), stream.avg_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .map(parse_fraction)
        .find(|fps| *fps > 0.0)
        .unwrap_or(0.0)
}

/// Whether the probed file carries at least one video stream.
pub fn has_video_stream(probe: &FfprobeOutput) -> bool {
    first_video_stream(probe).is_some()
}

/// Whether the probed file carries at least one audio stream.
pub fn has_audio_stream(probe: &FfprobeOutput) -> bool {
    probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"))
}

/// Parse a fraction string like `"30/1"` into a float.
fn parse_fraction(s: &str) -> f64 {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() == 2 {
        let num = parts[0].parse::<f64>().unwrap_or(0.0);
        let den = parts[1].parse::<f64>().unwrap_or(1.0);
        if den > 0.0 {
            return num / den;
        }
        return 0.0;
    }
    s.parse::<f64>().unwrap_or(0.0)
}
