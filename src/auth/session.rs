use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fs4::fs_std::FileExt;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, Response};
use serde_json::Value;
use tokio::fs;

use super::error::AuthError;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

/// Keep only word characters (alphanumeric + underscore); used to name the
/// per-account cookie, session and lock files.
pub fn sanitize_username(username: &str) -> String {
    username
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

fn is_cookie_expired(cookie_str: &str, now: &chrono::DateTime<chrono::Utc>) -> bool {
    if let Ok(parsed) = cookie::Cookie::parse(cookie_str) {
        if let Some(expires) = parsed.expires_datetime() {
            let expires_utc =
                chrono::DateTime::<chrono::Utc>::from(std::time::SystemTime::from(expires));
            return expires_utc < *now;
        }
    }
    false
}

/// A single persisted cookie entry (URL + Set-Cookie header value).
#[derive(serde::Deserialize)]
struct CookieEntry {
    url: String,
    cookie: String,
}

/// Load a cookie file into `jar`. Accepts the JSON `[{url, cookie}]` format
/// and the older tab-separated `url\tSet-Cookie` format. Expired cookies are
/// dropped. Returns how many cookies were added.
fn load_cookies(contents: &str, jar: &reqwest::cookie::Jar) -> usize {
    let now = chrono::Utc::now();
    let pairs: Vec<(String, String)> = match serde_json::from_str::<Vec<CookieEntry>>(contents) {
        Ok(entries) => entries.into_iter().map(|e| (e.url, e.cookie)).collect(),
        Err(_) => contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("Set-Cookie3:"))
            .filter_map(|l| l.split_once('\t'))
            .map(|(u, c)| (u.to_string(), c.to_string()))
            .collect(),
    };

    let mut loaded = 0;
    for (url_str, cookie_str) in pairs {
        if is_cookie_expired(&cookie_str, &now) {
            tracing::debug!("Pruning expired cookie from {}", url_str);
            continue;
        }
        if let Ok(url) = url_str.parse::<url::Url>() {
            jar.add_cookie_str(&cookie_str, &url);
            loaded += 1;
        }
    }
    loaded
}

/// A previously established iCloud web session, loaded from disk.
///
/// The cookie jar and session file are written by the interactive login
/// tool; this type only reads them. An exclusive lock file is held for the
/// lifetime of the value so two sync runs never share one account.
pub struct Session {
    client: Client,
    session_data: HashMap<String, String>,
    home_endpoint: String,
    /// Released when dropped.
    _lock_file: std::fs::File,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("home_endpoint", &self.home_endpoint)
            .field("session_data", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl Session {
    pub async fn load(
        cookie_dir: &Path,
        username: &str,
        home_endpoint: &str,
        timeout_secs: Option<u64>,
    ) -> Result<Self, AuthError> {
        let sanitized = sanitize_username(username);
        let session_path = cookie_dir.join(format!("{}.session", sanitized));
        if !session_path.exists() {
            return Err(AuthError::NoSession { path: session_path });
        }

        let lock_path = cookie_dir.join(format!("{}.lock", sanitized));
        let lock_file = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::create(&lock_path)?;
            file.try_lock_exclusive()
                .map_err(|_| AuthError::Locked { path: lock_path })?;
            Ok::<_, AuthError>(file)
        })
        .await
        .map_err(|e| AuthError::Io(std::io::Error::other(e)))??;

        let contents = fs::read_to_string(&session_path).await?;
        let session_data: HashMap<String, String> =
            serde_json::from_str::<HashMap<String, Value>>(&contents)?
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect();
        tracing::debug!("Loaded session data from {}", session_path.display());

        let cookie_jar = Arc::new(reqwest::cookie::Jar::default());
        let cookiejar_path = cookie_dir.join(&sanitized);
        match fs::read_to_string(&cookiejar_path).await {
            Ok(contents) => {
                let n = load_cookies(&contents, &cookie_jar);
                tracing::debug!("Read {} cookies from {}", n, cookiejar_path.display());
            }
            Err(e) => tracing::warn!(
                "Failed to read cookie jar {}: {}",
                cookiejar_path.display(),
                e
            ),
        }

        // Origin/Referer headers are required by Apple's CORS checks
        let mut default_headers = HeaderMap::new();
        let origin = HeaderValue::from_str(home_endpoint)
            .map_err(|e| AuthError::Io(std::io::Error::other(e)))?;
        let referer = HeaderValue::from_str(&format!("{}/", home_endpoint))
            .map_err(|e| AuthError::Io(std::io::Error::other(e)))?;
        default_headers.insert(ORIGIN, origin);
        default_headers.insert(REFERER, referer);
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let client = Client::builder()
            .cookie_provider(cookie_jar)
            .default_headers(default_headers)
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(30)))
            .build()?;

        Ok(Self {
            client,
            session_data,
            home_endpoint: home_endpoint.to_string(),
            _lock_file: lock_file,
        })
    }

    pub fn client_id(&self) -> Option<&str> {
        self.session_data.get("client_id").map(String::as_str)
    }

    pub fn has_session_token(&self) -> bool {
        self.session_data.contains_key("session_token")
    }

    pub async fn post(&self, url: &str, body: &str) -> Result<Response, AuthError> {
        tracing::debug!("POST {}", url);
        Ok(self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await?)
    }

    /// The underlying HTTP client, sharing this session's cookie jar.
    pub fn http_client(&self) -> Client {
        self.client.clone()
    }
}
