//! Health check endpoint

use axum::{routing::get, Json, Router};
use questline_common::api::HealthResponse;

use crate::AppState;

/// GET /health
///
/// Unauthenticated probe for monitoring.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "questline-engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
