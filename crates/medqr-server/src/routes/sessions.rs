//! Scan session endpoints.
//!
//! `scan` is the hot path: it resolves the submitted code, appends the scan
//! to the session, and reports whether the accumulated sequence now matches
//! a configured flow. `execute` hands the matched flow to the operation
//! executor; auto-executing operations run inside the same request.

use axum::{Json, extract::Path, extract::State, http::StatusCode};
use medqr_core::ScannedEntity;
use medqr_session::{DeviceClass, ScanOutcome, ScanSession};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub user_id: String,
    #[serde(default)]
    pub device_class: DeviceClass,
}

pub async fn start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let session_id = state
        .sessions
        .start_session(&req.user_id, req.device_class)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "session_id": session_id }))))
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// The raw scanned code, signature and all.
    pub code: String,
}

pub async fn scan(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<Value>, ApiError> {
    let resolution = state.tokens.resolve(&req.code).await?;
    let scan = ScannedEntity::new(resolution.entity_type, resolution.entity_id)
        .with_data(resolution.metadata);

    let outcome = state.sessions.add_scan(session_id, scan).await?;
    Ok(Json(shape_outcome(outcome)))
}

fn shape_outcome(outcome: ScanOutcome) -> Value {
    match outcome {
        ScanOutcome::Matched {
            flow,
            action_required,
        } => json!({
            "matched": true,
            "flow": flow.name,
            "action": flow.action,
            "auto_execute": flow.auto_execute,
            "action_required": action_required,
        }),
        ScanOutcome::NoMatch {
            scan_count,
            current_sequence,
        } => json!({
            "matched": false,
            "scan_count": scan_count,
            "current_sequence": current_sequence,
        }),
    }
}

/// Execute the session's matched flow. When the scanned sequence also maps
/// to a configured operation, the executor runs (or stages) it in the same
/// request; otherwise only the flow result is returned and the caller
/// dispatches the action itself.
pub async fn execute(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = state
        .sessions
        .get_session(session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Session expired or not found"))?;
    let user_id = session.user_id.clone();

    let flow = state.sessions.execute_flow(session_id).await?;

    let definition = state
        .executor
        .match_operation(&flow.entities)
        .ok()
        .cloned();
    let Some(definition) = definition else {
        return Ok(Json(json!({
            "flow": flow.flow_name,
            "action": flow.action,
            "execution": Value::Null,
        })));
    };

    let receipt = state
        .executor
        .execute_operation(&definition, Some(session_id), &user_id, flow.entities)
        .await?;

    Ok(Json(json!({
        "flow": flow.flow_name,
        "action": flow.action,
        "execution": receipt.execution,
        "message": receipt.message,
    })))
}

pub async fn show(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ScanSession>, ApiError> {
    let session = state
        .sessions
        .get_session(session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Session expired or not found"))?;
    Ok(Json(session))
}

pub async fn end(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let ended = state.sessions.end_session(session_id).await?;
    Ok(Json(json!({ "ended": ended })))
}
