// Ollama HTTP client for commit message generation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{MessageClient, MessageClientError};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the Ollama generate API.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

impl OllamaClient {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        max_tokens: u32,
    ) -> Result<Self, MessageClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| MessageClientError::Unreachable(error.to_string()))?;

        Ok(Self {
            http,
            base_url: url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens,
        })
    }

    /// True when the backend answers its tags endpoint.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.http.get(&url).timeout(HEALTH_CHECK_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                warn!(error = %error, "ollama health check failed");
                false
            }
        }
    }

    /// Models the backend has available.
    pub async fn list_models(&self) -> Result<Vec<String>, MessageClientError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(MessageClientError::Http { status: response.status().as_u16() });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|error| MessageClientError::InvalidResponse(error.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate_completion(
        &self,
        system: String,
        prompt: String,
    ) -> Result<String, MessageClientError> {
        let url = format!("{}/api/generate", self.base_url);
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "system": system,
            "stream": false,
            "options": {
                "num_predict": self.max_tokens,
                "temperature": 0.7,
            }
        });

        debug!(model = %self.model, "requesting commit message from ollama");
        let response =
            self.http.post(&url).json(&payload).send().await.map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(MessageClientError::Http { status: response.status().as_u16() });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|error| MessageClientError::InvalidResponse(error.to_string()))?;

        let text = body
            .response
            .ok_or_else(|| MessageClientError::InvalidResponse("missing `response` field".into()))?;
        if text.trim().is_empty() {
            return Err(MessageClientError::EmptyResponse);
        }
        Ok(text)
    }
}

impl MessageClient for OllamaClient {
    fn generate(
        &self,
        system: &str,
        user_prompt: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, MessageClientError>> + Send>> {
        let client = self.clone();
        let system = system.to_string();
        let prompt = user_prompt.to_string();
        Box::pin(async move { client.generate_completion(system, prompt).await })
    }
}

fn map_transport_error(error: reqwest::Error) -> MessageClientError {
    if error.is_timeout() {
        MessageClientError::Timeout
    } else if error.is_connect() {
        MessageClientError::Unreachable(error.to_string())
    } else if let Some(status) = error.status() {
        MessageClientError::Http { status: status.as_u16() }
    } else {
        MessageClientError::Unreachable(error.to_string())
    }
}
