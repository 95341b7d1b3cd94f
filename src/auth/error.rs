use std::path::PathBuf;

use thiserror::Error;

/// Failures loading or validating a persisted iCloud session.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No saved session at {}; log in with an interactive iCloud client first", path.display())]
    NoSession { path: PathBuf },

    #[error("Another instance is already using this account (lock: {})", path.display())]
    Locked { path: PathBuf },

    #[error("Saved session is no longer valid, re-authenticate interactively: {0}")]
    InvalidToken(String),

    #[error("Validate response is missing {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
