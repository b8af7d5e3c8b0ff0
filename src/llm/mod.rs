pub mod backend;
pub mod ollama;
pub mod schema;
pub mod scripted;

pub use backend::{GenerateRequest, Generation, LlmBackend, LlmError};
pub use ollama::OllamaBackend;
pub use scripted::ScriptedBackend;
