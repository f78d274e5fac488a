use std::path::PathBuf;
use std::time::Duration;

use reface_core::ffmpeg::FfmpegTools;

/// Frame pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root under which per-job workspaces are created.
    pub temp_root: PathBuf,
    /// Base URL of the face engine sidecar.
    pub face_engine_url: String,
    /// Upper bound for a single face engine call (detect or swap).
    pub face_call_timeout: Duration,
    /// Upper bound for a single media toolchain call.
    pub media_call_timeout: Duration,
    /// Re-encode the source into a normalized MP4 before extracting frames.
    pub normalize_source: bool,
    /// ffmpeg/ffprobe binaries and encoder settings.
    pub ffmpeg: FfmpegTools,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir().join("reface"),
            face_engine_url: "http://127.0.0.1:7860".to_string(),
            face_call_timeout: Duration::from_secs(60),
            media_call_timeout: Duration::from_secs(1800),
            normalize_source: false,
            ffmpeg: FfmpegTools::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                  |
    /// |----------------------------|--------------------------|
    /// | `TEMP_DIR`                 | `$TMPDIR/reface`         |
    /// | `FACE_ENGINE_URL`          | `http://127.0.0.1:7860`  |
    /// | `FACE_ENGINE_TIMEOUT_SECS` | `60`                     |
    /// | `MEDIA_TOOL_TIMEOUT_SECS`  | `1800`                   |
    /// | `NORMALIZE_SOURCE`         | `false`                  |
    /// | `FFMPEG_PATH`              | `ffmpeg`                 |
    /// | `FFPROBE_PATH`             | `ffprobe`                |
    /// | `VIDEO_ENCODER`            | `libx264`                |
    /// | `VIDEO_CRF`                | `18`                     |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let temp_root = std::env::var("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.temp_root);

        let face_engine_url = std::env::var("FACE_ENGINE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.face_engine_url);

        let face_call_timeout: u64 = std::env::var("FACE_ENGINE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("FACE_ENGINE_TIMEOUT_SECS must be a valid u64");

        let media_call_timeout: u64 = std::env::var("MEDIA_TOOL_TIMEOUT_SECS")
            .unwrap_or_else(|_| "1800".into())
            .parse()
            .expect("MEDIA_TOOL_TIMEOUT_SECS must be a valid u64");

        let normalize_source: bool = std::env::var("NORMALIZE_SOURCE")
            .unwrap_or_else(|_| "false".into())
            .parse()
            .expect("NORMALIZE_SOURCE must be true or false");

        let ffmpeg = FfmpegTools {
            ffmpeg: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg.ffmpeg),
            ffprobe: std::env::var("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg.ffprobe),
            encoder: std::env::var("VIDEO_ENCODER").unwrap_or(defaults.ffmpeg.encoder),
            crf: std::env::var("VIDEO_CRF")
                .unwrap_or_else(|_| "18".into())
                .parse()
                .expect("VIDEO_CRF must be a valid u8"),
        };

        Self {
            temp_root,
            face_engine_url,
            face_call_timeout: Duration::from_secs(face_call_timeout),
            media_call_timeout: Duration::from_secs(media_call_timeout),
            normalize_source,
            ffmpeg,
        }
    }
}
