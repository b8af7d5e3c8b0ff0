//! Ollama transport: `/api/generate` with the schema as `format`, `/api/tags` for listing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::backend::{GenerateRequest, Generation, LlmBackend, LlmError};

pub struct OllamaBackend {
    client: Client,
    health_client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        health_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| LlmError::Network(format!("failed to build http client: {err}")))?;
        let health_client = Client::builder()
            .timeout(health_timeout)
            .build()
            .map_err(|err| LlmError::Network(format!("failed to build health client: {err}")))?;

        Ok(Self {
            client,
            health_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.timeout.as_secs())
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a serde_json::Value>,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateEnvelope {
    response: String,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct TagsEnvelope {
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        self.health_client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .health_client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|err| LlmError::Unavailable(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed { status, body });
        }

        let tags: TagsEnvelope = response
            .json()
            .await
            .map_err(|err| LlmError::MalformedEnvelope(err.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate(&self, request: GenerateRequest) -> Result<Generation, LlmError> {
        let body = GenerateBody {
            model: &self.model,
            prompt: &request.prompt,
            stream: false,
            format: request.schema.as_ref(),
            options: GenerateOptions {
                num_predict: request.max_output_tokens,
            },
        };

        debug!(model = %self.model, prompt_chars = request.prompt.len(), "sending generate request");

        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed { status, body });
        }

        let envelope: GenerateEnvelope = response
            .json()
            .await
            .map_err(|err| LlmError::MalformedEnvelope(err.to_string()))?;

        Ok(Generation {
            text: envelope.response,
            prompt_tokens: envelope.prompt_eval_count,
            completion_tokens: envelope.eval_count,
        })
    }
}
