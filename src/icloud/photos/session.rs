use serde_json::Value;

use crate::icloud::error::ICloudError;
use crate::retry::{self, RetryAction, RetryConfig};

/// Minimal async transport used by the photos service. Implemented for
/// `reqwest::Client` (carrying the loaded session's cookies) and by scripted
/// fakes in tests.
#[async_trait::async_trait]
pub trait PhotosSession: Send + Sync {
    /// POST `body` as `text/plain` and parse the JSON response.
    async fn post(&self, url: &str, body: &str) -> Result<Value, ICloudError>;
}

#[async_trait::async_trait]
impl PhotosSession for reqwest::Client {
    async fn post(&self, url: &str, body: &str) -> Result<Value, ICloudError> {
        let resp = reqwest::Client::post(self, url)
            .header("Content-type", "text/plain")
            .body(body.to_owned())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ICloudError::HttpStatus {
                status: status.as_u16(),
                url: url.split('?').next().unwrap_or(url).to_string(),
            });
        }
        Ok(resp.json().await?)
    }
}

/// `session.post` with backoff on throttling, server errors and transport
/// failures.
pub async fn retry_post(
    session: &dyn PhotosSession,
    url: &str,
    body: &str,
    retry_config: &RetryConfig,
) -> Result<Value, ICloudError> {
    retry::retry_with_backoff(
        retry_config,
        "CloudKit query",
        |e: &ICloudError| {
            if e.is_retryable() {
                RetryAction::Retry
            } else {
                RetryAction::Abort
            }
        },
        || session.post(url, body),
    )
    .await
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted session returning canned responses in order.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    pub struct ScriptedSession {
        responses: Arc<Mutex<VecDeque<Result<Value, u16>>>>,
        pub requests: Arc<Mutex<Vec<(String, Value)>>>,
    }

    impl ScriptedSession {
        pub fn new(responses: impl IntoIterator<Item = Value>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses.into_iter().map(Ok).collect())),
                ..Self::default()
            }
        }

        /// Queue an HTTP error status as the next response.
        pub fn then_status(self, status: u16) -> Self {
            self.responses.lock().unwrap().push_back(Err(status));
            self
        }

        pub fn then(self, response: Value) -> Self {
            self.responses.lock().unwrap().push_back(Ok(response));
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn request_body(&self, i: usize) -> Value {
            self.requests.lock().unwrap()[i].1.clone()
        }
    }

    #[async_trait::async_trait]
    impl PhotosSession for ScriptedSession {
        async fn post(&self, url: &str, body: &str) -> Result<Value, ICloudError> {
            let parsed: Value = serde_json::from_str(body)?;
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), parsed));
            tokio::task::yield_now().await;
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(v)) => Ok(v),
                Some(Err(status)) => Err(ICloudError::HttpStatus {
                    status,
                    url: url.to_string(),
                }),
                None => Ok(serde_json::json!({"records": []})),
            }
        }
    }
}
