//! Execution confirmation and audit endpoints.

use axum::{Json, extract::Path, extract::State};
use medqr_ops::OperationExecution;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub user_id: String,
}

pub async fn confirm(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<Value>, ApiError> {
    let receipt = state
        .executor
        .confirm_execution(execution_id, &req.user_id)
        .await?;
    Ok(Json(json!({
        "execution": receipt.execution,
        "message": receipt.message,
    })))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let receipt = state.executor.cancel_execution(execution_id).await?;
    Ok(Json(json!({
        "execution": receipt.execution,
        "message": receipt.message,
    })))
}

pub async fn show(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<OperationExecution>, ApiError> {
    let execution = state
        .executor
        .get_execution(execution_id)
        .await
        .ok_or_else(|| ApiError::not_found("Execution not found"))?;
    Ok(Json(execution))
}
