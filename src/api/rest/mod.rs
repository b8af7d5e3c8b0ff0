pub mod attempts;
pub mod games;
pub mod officials;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(officials::router())
        .merge(games::router())
        .merge(attempts::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/llm/models", get(llm_models))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    officials: usize,
    games: usize,
    attempts: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.backend.model().to_string(),
        officials: state.store.officials().len(),
        games: state.store.games().len(),
        attempts: state.store.attempts().len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

#[derive(Serialize)]
struct ModelsResponse {
    configured: String,
    available: Vec<String>,
}

async fn llm_models(State(state): State<Arc<AppState>>) -> Result<Json<ModelsResponse>, AppError> {
    let available = state.backend.list_models().await?;
    Ok(Json(ModelsResponse {
        configured: state.backend.model().to_string(),
        available,
    }))
}
