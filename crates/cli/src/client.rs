// HTTP client for the daemon's REST API.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use cadence_common::protocol::api::{
    ControlRequest, ControlResponse, ErrorEnvelope, HistoryResponse, StatsResponse,
    StatusResponse, CONTROL_PATH, HISTORY_PATH, STATS_PATH, STATUS_PATH,
};
use cadence_common::types::ControlAction;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7870";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Trigger waits for a whole attempt, including push retries.
const TRIGGER_TIMEOUT: Duration = Duration::from_secs(300);

/// Resolve the daemon base URL: flag, then `CADENCE_URL`, then default.
pub fn resolve_base_url(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("CADENCE_URL").ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// A typed API error that can be inspected through an `anyhow` chain.
#[derive(Debug)]
pub struct ApiRequestError {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ApiRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiRequestError {}

pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client should build");
        Self { http, base_url }
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.get(STATUS_PATH).await
    }

    pub async fn history(&self, limit: Option<usize>, search: Option<&str>) -> Result<HistoryResponse> {
        let mut path = format!("{HISTORY_PATH}?");
        if let Some(limit) = limit {
            path.push_str(&format!("limit={limit}&"));
        }
        if let Some(term) = search {
            path.push_str(&format!("q={}&", urlencode(term)));
        }
        self.get(path.trim_end_matches(['?', '&'])).await
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        self.get(STATS_PATH).await
    }

    pub async fn control(&self, action: ControlAction) -> Result<ControlResponse> {
        let timeout = if action == ControlAction::Trigger {
            TRIGGER_TIMEOUT
        } else {
            REQUEST_TIMEOUT
        };
        self.post(CONTROL_PATH, &ControlRequest::new(action), timeout).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to connect to daemon at {}", self.base_url))?;
        decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to connect to daemon at {}", self.base_url))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.context("failed to decode daemon response");
    }

    let envelope: Result<ErrorEnvelope, _> = response.json().await;
    match envelope {
        Ok(envelope) => Err(anyhow::Error::new(ApiRequestError {
            code: envelope.error.code,
            message: envelope.error.message,
        })),
        Err(_) => Err(anyhow::anyhow!("daemon returned HTTP {status}")),
    }
}

fn urlencode(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
                c.to_string()
            } else {
                c.to_string().bytes().map(|b| format!("%{b:02X}")).collect()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_resolution_prefers_flag() {
        let url = resolve_base_url(Some("http://10.0.0.2:9000/".into()));
        assert_eq!(url, "http://10.0.0.2:9000");
    }

    #[test]
    fn base_url_falls_back_to_default() {
        std::env::remove_var("CADENCE_URL");
        assert_eq!(resolve_base_url(None), DEFAULT_BASE_URL);
    }

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(urlencode("fix bug"), "fix%20bug");
        assert_eq!(urlencode("a&b=c"), "a%26b%3Dc");
        assert_eq!(urlencode("plain-term_1.x~"), "plain-term_1.x~");
    }
}
