use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::post;

use crate::error::AppError;
use crate::models::official::Official;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/officials", post(upsert_official).get(list_officials))
}

async fn upsert_official(
    State(state): State<Arc<AppState>>,
    Json(official): Json<Official>,
) -> Result<Json<Official>, AppError> {
    if official.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if official.roles.is_empty() {
        return Err(AppError::BadRequest(
            "an official needs at least one role".to_string(),
        ));
    }

    if official.max_distance.is_some_and(|max| max < 0.0) {
        return Err(AppError::BadRequest(
            "max_distance must be >= 0".to_string(),
        ));
    }

    if official.availability.iter().any(|w| w.start > w.end) {
        return Err(AppError::BadRequest(
            "availability window ends before it starts".to_string(),
        ));
    }

    state.store.upsert_official(official.clone());
    Ok(Json(official))
}

async fn list_officials(State(state): State<Arc<AppState>>) -> Json<Vec<Official>> {
    Json(state.store.officials())
}
