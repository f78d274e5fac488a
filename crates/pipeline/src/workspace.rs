//! Per-job temporary workspace.
//!
//! A [`Workspace`] owns a directory under the configured temp root. It is
//! removed by [`Workspace::release`] on normal exit paths and, as a last
//! resort, synchronously on drop (panic or cancelled future).

use std::io;
use std::path::{Path, PathBuf};

use reface_core::types::JobId;
use sha2::{Digest, Sha256};

/// Length of the hex path-hash segment in a workspace directory name.
const HASH_PREFIX_LEN: usize = 12;

#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    released: bool,
}

impl Workspace {
    /// Directory name for a job: `<stem>-<sha256(source)[..12]>-<job id>`.
    ///
    /// Keyed by the source path, with the job id appended so two jobs on the
    /// same source never share frames.
    pub fn key_for(source: &Path, job_id: JobId) -> String {
        let stem: String = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let digest = format!("{:x}", Sha256::digest(source.to_string_lossy().as_bytes()));
        format!(
            "{stem}-{}-{}",
            &digest[..HASH_PREFIX_LEN],
            job_id.simple()
        )
    }

    /// Create (clearing any leftover) the workspace for `source`.
    pub async fn prepare(temp_root: &Path, source: &Path, job_id: JobId) -> io::Result<Self> {
        let root = temp_root.join(Self::key_for(source, job_id));
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => tracing::debug!(path = %root.display(), "Cleared stale workspace"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let workspace = Self {
            root,
            released: false,
        };
        tokio::fs::create_dir_all(workspace.frames_dir()).await?;
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    /// Target of the optional container normalization.
    pub fn normalized_source(&self) -> PathBuf {
        self.root.join("source.mp4")
    }

    /// Reassembled video before audio restoration.
    pub fn silent_video(&self) -> PathBuf {
        self.root.join("silent.mp4")
    }

    /// Frame files ordered by frame number.
    ///
    /// Only files whose stem is a frame number count; the zero padding runs
    /// out at a million frames, so names are compared numerically.
    pub async fn frame_paths(&self) -> io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(self.frames_dir()).await?;
        let mut frames = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(number) = frame_number(&path) {
                frames.push((number, path));
            }
        }
        frames.sort_unstable_by_key(|(number, _)| *number);
        Ok(frames.into_iter().map(|(_, path)| path).collect())
    }

    /// Remove the workspace directory.
    pub async fn release(mut self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                self.released = true;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.released = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn frame_number(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse().ok()
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_dir_all(&self.root) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.root.display(), error = %e, "Failed to remove workspace");
                }
            }
        }
    }
}
