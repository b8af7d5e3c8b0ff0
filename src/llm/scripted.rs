//! In-process backend that replays canned replies.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

use super::backend::{GenerateRequest, Generation, LlmBackend, LlmError};

pub struct ScriptedBackend {
    model: String,
    available: AtomicBool,
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
    call_count: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            available: AtomicBool::new(true),
            replies: Mutex::new(VecDeque::new()),
            fallback: String::new(),
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }

    /// Queue a reply; replies are handed out in order.
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn with_failure(self, err: LlmError) -> Self {
        self.push(Err(err));
        self
    }

    /// Reply used once the queue runs dry.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn push(&self, reply: Result<String, LlmError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new("scripted")
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("scripted backend disabled".to_string()));
        }
        Ok(vec![self.model.clone()])
    }

    async fn generate(&self, request: GenerateRequest) -> Result<Generation, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("scripted backend disabled".to_string()));
        }

        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| Ok(self.fallback.clone()));

        let prompt_tokens = request.prompt.len() as u32 / 4;
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt);
        }

        let text = reply?;
        Ok(Generation {
            completion_tokens: text.len() as u32 / 4,
            text,
            prompt_tokens,
        })
    }
}
