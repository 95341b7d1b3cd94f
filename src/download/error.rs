use std::path::PathBuf;

use thiserror::Error;

/// Failure fetching one rendition to disk.
///
/// `is_retryable()` separates transient failures (server errors, rate limits,
/// truncated transfers) from permanent ones so the retry loop can give up
/// early on the latter.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error {status} downloading {path}")]
    HttpStatus { status: u16, path: String },

    #[error("Checksum mismatch for {0}")]
    ChecksumMismatch(String),

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("HTTP error downloading {path}: {source}")]
    Http {
        source: reqwest::Error,
        path: String,
    },

    #[error("Asset has no {version} rendition")]
    MissingVersion { version: String },

    #[error("Giving up on {path} after {retries} retries: {last_error}")]
    RetriesExhausted {
        retries: u32,
        path: String,
        last_error: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DownloadError {
    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            DownloadError::ChecksumMismatch(_) | DownloadError::Http { .. } => true,
            DownloadError::Disk(_)
            | DownloadError::MissingVersion { .. }
            | DownloadError::RetriesExhausted { .. }
            | DownloadError::Other(_) => false,
        }
    }
}

/// Terminal error of a download or reconcile run.
///
/// A run keeps exactly one of these even when several workers fail at once;
/// see `pool::WorkerPool`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Parallelism must be at least 1")]
    InvalidParallelism,

    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to resolve collection: {0:#}")]
    Collection(anyhow::Error),

    #[error("Failed to enumerate assets: {0:#}")]
    Enumerate(anyhow::Error),

    #[error("Failed to download {id} to {}: {source}", path.display())]
    Fetch {
        id: String,
        path: PathBuf,
        source: DownloadError,
    },

    #[error("Failed to delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Worker task failed: {0}")]
    WorkerPanicked(String),
}
