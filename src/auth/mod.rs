//! Loading an existing iCloud web session.
//!
//! Logging in (SRP, two-factor prompts, trusting the browser) is done by an
//! interactive client that writes the cookie jar and session file. This
//! module only picks those up and asks Apple whether they are still good.

pub mod endpoints;
pub mod error;
pub mod responses;
pub mod session;

use std::path::Path;

use self::endpoints::Endpoints;
use self::error::AuthError;
use self::responses::AccountLoginResponse;
use self::session::Session;
use crate::types::Domain;

/// A validated session plus what is needed to reach the photos database.
pub struct AccountSession {
    pub session: Session,
    pub dsid: String,
    pub ckdatabasews_url: String,
}

impl std::fmt::Debug for AccountSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSession")
            .field("session", &"<redacted>")
            .field("ckdatabasews_url", &self.ckdatabasews_url)
            .finish_non_exhaustive()
    }
}

/// Load the persisted session for `username` and validate it.
///
/// Fails with [`AuthError::NoSession`] when nothing has been saved yet and
/// with [`AuthError::InvalidToken`] when Apple rejects the saved session. In
/// both cases the user has to log in again with an interactive client.
pub async fn load_session(
    cookie_dir: &Path,
    username: &str,
    domain: Domain,
    timeout_secs: Option<u64>,
) -> Result<AccountSession, AuthError> {
    let endpoints = Endpoints::for_domain(domain);
    let session = Session::load(cookie_dir, username, endpoints.home, timeout_secs).await?;
    if !session.has_session_token() {
        return Err(AuthError::InvalidToken("no session token saved".into()));
    }

    let data = validate(&session, &endpoints).await?;
    let (dsid, ckdatabasews_url) = account_endpoints(&data)?;
    tracing::info!("Session for {} is valid", username);
    Ok(AccountSession {
        session,
        dsid,
        ckdatabasews_url,
    })
}

/// POST `{setup}/validate` with body "null".
async fn validate(
    session: &Session,
    endpoints: &Endpoints,
) -> Result<AccountLoginResponse, AuthError> {
    tracing::debug!("Checking session token validity");
    let response = session.post(&endpoints.validate_url(), "null").await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(AuthError::InvalidToken(format!("HTTP {}: {}", status.as_u16(), text)));
    }
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

fn account_endpoints(data: &AccountLoginResponse) -> Result<(String, String), AuthError> {
    let dsid = data.dsid().ok_or(AuthError::MissingField("dsInfo.dsid"))?;
    let url = data
        .ckdatabasews_url()
        .ok_or(AuthError::MissingField("webservices.ckdatabasews.url"))?;
    Ok((dsid.to_string(), url.to_string()))
}
