use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::error::AppError;
use crate::services::GameOutcome;
use crate::validation::validate_user_id;
use crate::AppState;

pub const GAME_HISTORY_LIMIT: i64 = 10;

/// Records a round the game engine has already settled.
pub async fn record_outcome(
    State(state): State<AppState>,
    Json(outcome): Json<GameOutcome>,
) -> Result<impl IntoResponse, AppError> {
    let recorded = state.recorder.record_game_outcome(outcome).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validate_user_id(&user_id)?;
    let games = state.resolver.recent_games(&user_id, GAME_HISTORY_LIMIT).await?;
    Ok(Json(games))
}
