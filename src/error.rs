use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Llm(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Decides whether an error may move an attempt to `failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The model could not be reached or answered with a broken envelope.
    Transport,
    /// A position could not be filled under the crew constraints.
    Validation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Error)]
#[error("game {game_id}: {message}")]
pub struct AttemptError {
    pub class: ErrorClass,
    pub game_id: i64,
    pub message: String,
}

impl AttemptError {
    pub fn transport(game_id: i64, err: &LlmError) -> Self {
        Self {
            class: ErrorClass::Transport,
            game_id,
            message: err.to_string(),
        }
    }

    pub fn validation(game_id: i64, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Validation,
            game_id,
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        self.class == ErrorClass::Transport
    }
}
