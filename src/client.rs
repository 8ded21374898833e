//! Authenticated HTTP client for the screenshot server.
//!
//! One `reqwest::Client` is built per `ServerClient` and shared by every
//! operation, including the thumbnail engine's concurrent fetches, so all
//! requests ride the same connection pool and the same session cookies.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::{ClientError, Result};
use crate::session::SessionStore;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Server verdict for a delete request. The server is the sole source of
/// truth for whether deletion succeeded.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: Option<String>,
}

pub struct ServerClient {
    client: Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl ServerClient {
    /// Build a client for `base_url` (e.g. `http://192.168.1.100:5000`).
    ///
    /// The URL is validated up front; a trailing slash is dropped so paths
    /// can be appended with `format!`.
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ClientError::Authentication(format!("Invalid server URL: {}", e)))?;
        if parsed.host_str().is_none() {
            return Err(ClientError::Authentication(
                "Server URL has no host".to_string(),
            ));
        }

        let session = Arc::new(SessionStore::new());

        let client = Client::builder()
            .cookie_provider(session.clone())
            .connect_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> Arc<SessionStore> {
        self.session.clone()
    }

    /// POST form-encoded credentials. Success is defined purely by a 2xx
    /// status; the session cookie lands in the store via the transport.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let url = format!("{}/login", self.base_url);
        log::info!("Logging in to {} as {}", self.base_url, username);

        let response = self
            .client
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Authentication(format!(
                "Login rejected with HTTP {}",
                status
            )));
        }

        Ok(())
    }

    /// Fetch the HTML listing for a directory. `path` may be empty for the
    /// root and must already be percent-encoded.
    pub async fn browse(&self, path: &str) -> Result<String> {
        let url = format!("{}/browse/{}", self.base_url, path);
        log::info!("Browsing /{}", path);

        let response = self.client.get(&url).send().await?;
        let body = self.check_status(response)?.text().await?;
        Ok(body)
    }

    /// Fetch raw bytes from the streaming endpoint. Used by the thumbnail
    /// engine and by download.
    pub async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/stream/{}", self.base_url, path);
        log::debug!("Fetching {}", url);

        let response = self.client.get(&url).send().await?;
        let bytes = self.check_status(response)?.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// Ask the server to delete the file at `path`.
    ///
    /// The body is built by hand: `path` is already percent-encoded and form
    /// serialization would encode it a second time.
    pub async fn delete(&self, path: &str) -> Result<DeleteResponse> {
        let url = format!("{}/delete", self.base_url);
        log::info!("Deleting {}", path);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(format!("path={}", path))
            .send()
            .await?;

        let verdict: DeleteResponse = self.check_status(response)?.json().await?;
        Ok(verdict)
    }

    /// Drop the session cookies.
    pub fn logout(&self) {
        log::info!("Clearing session for {}", self.base_url);
        self.session.clear();
    }

    /// Map a non-2xx status to the error taxonomy. 401/403 means the session
    /// is absent or invalid; the caller must log in again, never retry.
    fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::Authentication(format!(
                "Session rejected with HTTP {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(ClientError::Http(status));
        }
        Ok(response)
    }
}
