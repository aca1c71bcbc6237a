//! HTTP client for the ScentMatch API.
//!
//! Authenticated calls go through `bearer`, which owns the refresh policy:
//! a session inside the expiry skew is refreshed once before the call. A
//! refresh the server rejects clears the session file; a transport failure
//! leaves it alone so the next run can retry.

use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::CliError;
use crate::session::{Session, SessionStore, unix_now};

pub const API_PREFIX: &str = "/api/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: SessionStore,
}

impl ApiClient {
    pub fn new(base_url: &str, store: SessionStore) -> Result<Self, CliError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned(), store })
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Absolute URL for a path under the API prefix.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    /// Absolute URL for a root-level path such as `/health`.
    #[must_use]
    pub fn root_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    pub async fn get(&self, url: &str) -> Result<Value, CliError> {
        send(self.http.get(url)).await
    }

    pub async fn get_query(&self, url: &str, query: &[(&str, String)]) -> Result<Value, CliError> {
        send(self.http.get(url).query(query)).await
    }

    pub async fn post(&self, url: &str, body: &Value) -> Result<Value, CliError> {
        send(self.http.post(url).json(body)).await
    }

    pub async fn authed(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value, CliError> {
        let token = self.bearer().await?;
        let request = self.http.request(method, url).bearer_auth(token);
        let request = if let Some(body) = body { request.json(body) } else { request };
        send(request).await
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    /// Exchange credentials for a token pair and persist the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, CliError> {
        let value = self
            .post(&self.api_url("/auth/login"), &json!({ "email": email, "password": password }))
            .await?;
        let pair: TokenPair = serde_json::from_value(value)?;
        let session = Session::from_pair(pair, unix_now());
        self.store.save(&session)?;
        Ok(session)
    }

    /// Revoke the access token server-side when possible, then forget the
    /// session locally regardless of the outcome.
    pub async fn logout(&self) -> Result<bool, CliError> {
        let Some(session) = self.store.load()? else {
            return Ok(false);
        };
        let revoked = if session.is_expired(unix_now()) {
            false
        } else {
            let request = self
                .http
                .post(self.api_url("/auth/logout"))
                .bearer_auth(&session.access_token);
            match send(request).await {
                Ok(_) => true,
                Err(e) => {
                    eprintln!("warning: server-side logout failed: {e}");
                    false
                }
            }
        };
        self.store.clear()?;
        Ok(revoked)
    }

    /// A usable access token, refreshing an expiring session first.
    pub async fn bearer(&self) -> Result<String, CliError> {
        let session = self.store.load()?.ok_or(CliError::NotLoggedIn)?;
        if !session.is_expired(unix_now()) {
            return Ok(session.access_token);
        }
        let Some(refresh_token) = session.refresh_token else {
            self.store.clear()?;
            return Err(CliError::SessionExpired);
        };
        match self.refresh(&refresh_token).await {
            Ok(fresh) => Ok(fresh.access_token),
            Err(CliError::Server { .. } | CliError::InvalidJson(_)) => {
                self.store.clear()?;
                Err(CliError::SessionExpired)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, CliError> {
        let value = self
            .post(&self.api_url("/auth/refresh"), &json!({ "refresh_token": refresh_token }))
            .await?;
        let pair: TokenPair = serde_json::from_value(value)?;
        let session = Session::from_pair(pair, unix_now());
        self.store.save(&session)?;
        Ok(session)
    }
}

async fn send(request: RequestBuilder) -> Result<Value, CliError> {
    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    if !status.is_success() {
        return Err(CliError::Server { status: status.as_u16(), message: error_message(&value) });
    }
    Ok(value)
}

/// Message from the `{error: {message}}` envelope, falling back to a
/// `detail` field or the raw body.
pub(crate) fn error_message(body: &Value) -> String {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| body.get("detail").and_then(Value::as_str))
        .or_else(|| body.as_str().filter(|s| !s.trim().is_empty()))
        .map_or_else(|| "request failed".to_owned(), ToOwned::to_owned)
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
