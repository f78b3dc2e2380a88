use crate::dto::StatusSnapshot;
use std::time::Duration;
use tracing::debug;
use vlc_presence_core::VlcConfig;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Player not running, interface disabled, or request timed out.
    #[error("player unreachable: {0}")]
    Unavailable(String),
    #[error("player rejected the configured HTTP password")]
    Unauthorized,
    #[error("malformed status response: {0}")]
    Malformed(String),
}

/// Polls VLC's HTTP control interface for the current playback status.
///
/// Every request is bounded by the configured timeout so a hung player can
/// never stall the sync loop.
pub struct StatusSource {
    client: reqwest::Client,
    status_url: String,
    password: String,
}

impl StatusSource {
    pub fn new(cfg: &VlcConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            status_url: format!(
                "http://localhost:{}/requests/status.json",
                cfg.http_port
            ),
            password: cfg.http_password.clone(),
        }
    }

    pub async fn poll(&self) -> Result<StatusSnapshot, SourceError> {
        let mut request = self.client.get(&self.status_url);
        // VLC's HTTP auth uses an empty username.
        if !self.password.is_empty() {
            request = request.basic_auth("", Some(&self.password));
        }

        let response = request
            .send()
            .await
            .map_err(|err| SourceError::Unavailable(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SourceError::Unauthorized);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("player answered 404; HTTP interface not configured");
            return Err(SourceError::Unavailable(
                "HTTP interface answered 404".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!("HTTP {status}")));
        }

        response.json::<StatusSnapshot>().await.map_err(|err| {
            if err.is_decode() {
                SourceError::Malformed(err.to_string())
            } else {
                SourceError::Unavailable(err.to_string())
            }
        })
    }

    /// One-shot reachability probe with an operator-facing message, used by
    /// the `doctor` subcommand.
    pub async fn check(&self) -> (bool, String) {
        match self.poll().await {
            Ok(_) => (
                true,
                "VLC is running and the HTTP interface is accessible".to_string(),
            ),
            Err(SourceError::Unauthorized) => (
                false,
                "VLC is running but authentication failed (incorrect password)".to_string(),
            ),
            Err(SourceError::Malformed(detail)) => (
                false,
                format!("VLC answered with an unexpected response: {detail}"),
            ),
            Err(SourceError::Unavailable(detail)) => (
                false,
                format!("VLC is not running or the HTTP interface is not enabled ({detail})"),
            ),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.status_url
    }
}
