//! Downstream result delivery
//!
//! Completed, sanitized payloads are posted verbatim to the configured
//! remote endpoint. The text is already valid JSON at this point, so it is
//! sent as-is under a JSON content type rather than re-encoded.

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::debug;
use url::Url;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts sanitized result payloads to the downstream consumer
#[derive(Clone, Debug)]
pub struct Forwarder {
    client: reqwest::Client,
    remote: Option<Url>,
}

impl Forwarder {
    /// Create a forwarder for an optional remote endpoint
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the remote URL does not parse.
    pub fn new(remote: Option<&str>) -> Result<Self> {
        let remote = match remote {
            Some(raw) => Some(Url::parse(raw).map_err(|e| Error::Config {
                message: format!("invalid remote url '{raw}': {e}"),
                key: Some("remote".to_string()),
            })?),
            None => None,
        };

        Ok(Self {
            client: reqwest::Client::new(),
            remote,
        })
    }

    /// Whether a remote endpoint is configured
    pub fn is_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// Post a payload downstream
    ///
    /// # Errors
    /// Returns [`Error::Forward`] when no remote is configured, or
    /// [`Error::Transport`] when the request fails or the remote rejects it.
    pub async fn forward(&self, payload: &str) -> Result<()> {
        let Some(remote) = &self.remote else {
            return Err(Error::Forward("no remote url configured".to_string()));
        };

        debug!(remote = %remote, bytes = payload.len(), "forwarding results");
        let response = self
            .client
            .post(remote.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .timeout(FORWARD_TIMEOUT)
            .send()
            .await?;

        response.error_for_status()?;
        Ok(())
    }
}
