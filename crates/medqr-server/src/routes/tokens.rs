//! Token issuance, resolution and revocation endpoints.

use axum::{Json, extract::Path, extract::State, http::StatusCode};
use medqr_core::EntityType;
use medqr_token::{Resolution, scan_url};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub entity_type: EntityType,
    pub entity_id: String,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

pub async fn issue(
    State(state): State<AppState>,
    Json(req): Json<IssueRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let token = state
        .tokens
        .issue(req.entity_type, &req.entity_id, req.ephemeral, req.metadata)
        .await?;
    let url = scan_url(&state.base_url, &token);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": token,
            "scan_url": url.as_str(),
            "ephemeral": req.ephemeral,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub token: String,
}

pub async fn resolve(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<Resolution>, ApiError> {
    let resolution = state.tokens.resolve(&req.token).await?;
    Ok(Json(resolution))
}

pub async fn revoke(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.tokens.revoke(id).await?;
    Ok(Json(json!({ "revoked": removed })))
}
