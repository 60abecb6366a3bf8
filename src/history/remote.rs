//! HTTP client for the remote session store

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use super::record::{SessionRecord, Steam64};

/// Requests give up after this long, the relay is best-effort
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for `POST /api/session` and `GET /api/history/:steam64`
#[derive(Clone)]
pub struct RemoteHistoryClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    sessions: Vec<SessionRecord>,
}

impl RemoteHistoryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RelayError::Request)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// Store one finished session. The record must carry a steam64.
    pub async fn post_session(&self, record: &SessionRecord) -> Result<(), RelayError> {
        if record.steam64.is_none() {
            return Err(RelayError::Unbound);
        }

        let response = self
            .client
            .post(self.api_url("session"))
            .json(record)
            .send()
            .await
            .map_err(RelayError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    /// Newest-first sessions stored for a player
    pub async fn fetch_history(&self, steam64: &Steam64) -> Result<Vec<SessionRecord>, RelayError> {
        let response = self
            .client
            .get(self.api_url(&format!("history/{}", steam64)))
            .send()
            .await
            .map_err(RelayError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: HistoryResponse = response.json().await.map_err(RelayError::Parse)?;
        Ok(body.sessions)
    }
}

/// Remote store errors
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No player bound to the session")]
    Unbound,
}
