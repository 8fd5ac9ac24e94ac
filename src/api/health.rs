//! Liveness, readiness and version.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::http::AppState;

/// GET /health/alive
pub async fn alive() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /health/ready. Not ready until a rule set has been loaded.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.load().rules.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "errors": { "rules": "access rules have not been loaded yet" } })),
        )
    }
}

/// GET /version
pub async fn version() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}
