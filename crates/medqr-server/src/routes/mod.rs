use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub mod operations;
pub mod sessions;
pub mod tokens;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tokens", post(tokens::issue))
        .route("/api/tokens/resolve", post(tokens::resolve))
        .route("/api/tokens/{id}", delete(tokens::revoke))
        .route("/api/sessions", post(sessions::start))
        .route("/api/sessions/{id}", get(sessions::show).delete(sessions::end))
        .route("/api/sessions/{id}/scans", post(sessions::scan))
        .route("/api/sessions/{id}/execute", post(sessions::execute))
        .route("/api/executions/{id}", get(operations::show))
        .route("/api/executions/{id}/confirm", post(operations::confirm))
        .route("/api/executions/{id}/cancel", post(operations::cancel))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
