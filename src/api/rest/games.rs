use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};

use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::game::Game;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/games", post(upsert_game).get(list_games))
        .route("/games/:id", delete(delete_game))
        .route("/games/:id/assignments", get(game_assignments))
}

async fn upsert_game(
    State(state): State<Arc<AppState>>,
    Json(game): Json<Game>,
) -> Result<Json<Game>, AppError> {
    if game.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    state.store.upsert_game(game.clone());
    Ok(Json(game))
}

async fn list_games(State(state): State<Arc<AppState>>) -> Json<Vec<Game>> {
    Json(state.store.games())
}

async fn delete_game(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Game>, AppError> {
    state
        .store
        .remove_game(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("game {id} not found")))
}

async fn game_assignments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    if state.store.game(id).is_none() {
        return Err(AppError::NotFound(format!("game {id} not found")));
    }

    Ok(Json(state.store.assignments_for_game(id)))
}
