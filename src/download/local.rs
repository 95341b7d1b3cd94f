//! Filesystem facade used by the sync passes: presence checks by size and
//! idempotent removal. Nothing here talks to the remote side.

use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use super::error::SyncError;

/// What is on disk at an asset's resolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Missing,
    /// A file exists with exactly the expected size.
    Matching,
    /// Something exists, but not a file of the expected size.
    SizeMismatch { actual: u64 },
}

/// Compare the file at `path` against `expected` bytes.
///
/// Metadata failures other than "not found" are logged and reported as
/// `Missing`; the fetch that follows surfaces the real problem.
pub async fn probe(path: &Path, expected: u64) -> Presence {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() == expected => Presence::Matching,
        Ok(meta) => Presence::SizeMismatch { actual: meta.len() },
        Err(e) if e.kind() == ErrorKind::NotFound => Presence::Missing,
        Err(e) => {
            tracing::warn!("Could not stat {}: {}", path.display(), e);
            Presence::Missing
        }
    }
}

/// Remove the file at `path`. Returns `Ok(false)` if it was already absent.
pub async fn remove(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Create `dir` and its parents. An existing directory is fine.
pub async fn ensure_dir(dir: &Path) -> Result<(), SyncError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|source| SyncError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
}
