use axum::{extract::{Path, State}, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.stats.snapshot()))
}

pub async fn enable_pipeline(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.stats.set_enabled(true);
    info!("Delivery pipeline enabled via API");
    Ok(Json(serde_json::json!({"enabled": true})))
}

pub async fn disable_pipeline(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.stats.set_enabled(false);
    info!("Delivery pipeline disabled via API");
    Ok(Json(serde_json::json!({"enabled": false})))
}

pub async fn list_dead_letters(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let failed = state.intent_repo.list_failed(100).await?;
    Ok(Json(failed))
}

pub async fn get_intent(
    State(state): State<Arc<AppState>>,
    Path(intent_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let intent = state
        .intent_repo
        .find_by_id(&intent_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Intent {} not found", intent_id)))?;
    Ok(Json(intent))
}
