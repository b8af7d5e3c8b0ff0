use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::attempt::{AssignmentAttempt, AttemptStatus};
use crate::models::evaluation::AssignmentEvaluation;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/attempts", post(start_attempt).get(list_attempts))
        .route("/attempts/:id", get(get_attempt).delete(delete_attempt))
        .route("/attempts/:id/evaluation", get(get_evaluation))
}

async fn start_attempt(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<AssignmentAttempt>) {
    let attempt = state.orchestrator.create_attempt();
    let orchestrator = state.orchestrator.clone();
    let attempt_id = attempt.id;

    tokio::spawn(async move {
        if let Err(err) = orchestrator.run_attempt(attempt_id).await {
            tracing::error!(attempt_id = %attempt_id, error = %err, "attempt run failed");
        }
    });

    (StatusCode::ACCEPTED, Json(attempt))
}

async fn list_attempts(State(state): State<Arc<AppState>>) -> Json<Vec<AssignmentAttempt>> {
    Json(state.store.attempts())
}

async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentAttempt>, AppError> {
    state
        .store
        .attempt(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("attempt {id} not found")))
}

async fn delete_attempt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentAttempt>, AppError> {
    if let Some(removed) = state
        .store
        .remove_attempt_if(id, |attempt| attempt.status != AttemptStatus::Processing)
    {
        return Ok(Json(removed));
    }

    match state.store.attempt(id) {
        Some(_) => Err(AppError::Conflict(format!(
            "attempt {id} is still processing"
        ))),
        None => Err(AppError::NotFound(format!("attempt {id} not found"))),
    }
}

async fn get_evaluation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentEvaluation>, AppError> {
    state
        .store
        .evaluation(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("evaluation for attempt {id} not found")))
}
