use thiserror::Error;

#[derive(Error, Debug)]
pub enum ICloudError {
    #[error("CloudKit returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Photo library not finished indexing")]
    IndexingNotFinished,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ICloudError {
    /// Throttling, server errors and transport failures are worth another
    /// attempt; a malformed response is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ICloudError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            ICloudError::Http(_) => true,
            ICloudError::IndexingNotFinished | ICloudError::Json(_) => false,
        }
    }
}
