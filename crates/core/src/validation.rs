//! Submission validation.
//!
//! Runs before a job is admitted; a rejected submission never creates a
//! job record. The checks touch the filesystem, so async callers run them
//! on the blocking pool.

use std::ops::Deref;
use std::path::Path;

use crate::error::CoreError;
use crate::job::JobSubmission;

/// Container extensions accepted as source videos.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "mkv", "webm", "avi", "wmv", "flv", "mpeg", "mpg", "3gp", "ts",
];

/// Extensions accepted for the target face image.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Whether `path` is an existing regular file with a video extension.
pub fn is_video(path: &Path) -> bool {
    path.is_file() && has_extension(path, VIDEO_EXTENSIONS)
}

/// Whether `path` carries a supported image extension (case-insensitive).
pub fn has_image_extension(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

fn require(value: &str, field: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// A submission that passed [`validate_submission`].
///
/// Only constructed by validation, so anything holding one may skip the
/// filesystem checks.
#[derive(Debug, Clone)]
pub struct ValidSubmission(JobSubmission);

impl Deref for ValidSubmission {
    type Target = JobSubmission;

    fn deref(&self) -> &JobSubmission {
        &self.0
    }
}

/// Validate a submission.
///
/// Checks, in order: all three fields present, source exists, source is a
/// video, target exists, target has an image extension, output differs from
/// the source.
pub fn validate_submission(submission: JobSubmission) -> Result<ValidSubmission, CoreError> {
    check(&submission)?;
    Ok(ValidSubmission(submission))
}

fn check(submission: &JobSubmission) -> Result<(), CoreError> {
    require(&submission.source_path, "source_path")?;
    require(&submission.target_face_path, "target_face_path")?;
    require(&submission.output_path, "output_path")?;

    let source = Path::new(&submission.source_path);
    if !source.exists() {
        return Err(CoreError::Validation("Source video not found".into()));
    }
    if !is_video(source) {
        return Err(CoreError::Validation(
            "Source path is not a video file".into(),
        ));
    }

    let target = Path::new(&submission.target_face_path);
    if !target.exists() {
        return Err(CoreError::Validation("Target face image not found".into()));
    }
    if !has_image_extension(target) {
        return Err(CoreError::Validation(
            "Target face path is not a valid image".into(),
        ));
    }

    if Path::new(&submission.output_path) == source {
        return Err(CoreError::Validation(
            "Output path must differ from the source video".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;

    use super::*;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("in.mp4"), b"video").unwrap();
            fs::write(dir.path().join("face.JPG"), b"image").unwrap();
            fs::write(dir.path().join("notes.txt"), b"text").unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).to_string_lossy().into_owned()
        }

        fn submission(&self, source: &str, target: &str) -> JobSubmission {
            JobSubmission {
                source_path: self.path(source),
                target_face_path: self.path(target),
                output_path: self.path("out.mp4"),
            }
        }
    }

    fn message(result: Result<ValidSubmission, CoreError>) -> String {
        match result {
            Err(CoreError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_valid_submission() {
        let fx = Fixture::new();
        assert!(validate_submission(fx.submission("in.mp4", "face.JPG")).is_ok());
    }

    #[test]
    fn rejects_missing_fields() {
        let fx = Fixture::new();
        let mut sub = fx.submission("in.mp4", "face.JPG");
        sub.output_path = "  ".into();
        assert_eq!(message(validate_submission(sub)), "output_path is required");
    }

    #[test]
    fn rejects_missing_source() {
        let fx = Fixture::new();
        assert_eq!(
            message(validate_submission(fx.submission("gone.mp4", "face.JPG"))),
            "Source video not found"
        );
    }

    #[test]
    fn rejects_non_video_source() {
        let fx = Fixture::new();
        assert_eq!(
            message(validate_submission(fx.submission("notes.txt", "face.JPG"))),
            "Source path is not a video file"
        );
    }

    #[test]
    fn rejects_missing_target() {
        let fx = Fixture::new();
        assert_eq!(
            message(validate_submission(fx.submission("in.mp4", "gone.png"))),
            "Target face image not found"
        );
    }

    #[test]
    fn rejects_non_image_target() {
        let fx = Fixture::new();
        assert_eq!(
            message(validate_submission(fx.submission("in.mp4", "notes.txt"))),
            "Target face path is not a valid image"
        );
    }

    #[test]
    fn rejects_output_equal_to_source() {
        let fx = Fixture::new();
        let mut sub = fx.submission("in.mp4", "face.JPG");
        sub.output_path = sub.source_path.clone();
        assert_matches!(validate_submission(sub), Err(CoreError::Validation(_)));
    }

    #[test]
    fn image_extension_is_case_insensitive() {
        assert!(has_image_extension(Path::new("a/b/face.WebP")));
        assert!(!has_image_extension(Path::new("a/b/face")));
        assert!(!has_image_extension(Path::new("a/b/face.gif")));
    }
}
