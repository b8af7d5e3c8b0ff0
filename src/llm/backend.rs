use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    /// The service did not answer a health check.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Non-2xx status from the service.
    #[error("request failed: HTTP {status}: {body}")]
    RequestFailed { status: u16, body: String },

    /// The envelope around the generated text could not be decoded.
    #[error("malformed response envelope: {0}")]
    MalformedEnvelope(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_output_tokens: u32,
    /// JSON schema the output must satisfy, when the backend supports it.
    pub schema: Option<serde_json::Value>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, max_output_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_output_tokens,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Model identifier recorded on every attempt.
    fn model(&self) -> &str;

    async fn is_available(&self) -> bool;

    async fn list_models(&self) -> Result<Vec<String>, LlmError>;

    async fn generate(&self, request: GenerateRequest) -> Result<Generation, LlmError>;
}
