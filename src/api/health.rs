//! Health check endpoint
//!
//! `/health` reports liveness, version and the number of live script runs.

use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use daad_bridge::ProcessBridge;
use serde::Serialize;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_runs: usize,
}

async fn health(Extension(bridge): Extension<ProcessBridge>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        active_runs: bridge.active_run_count().await,
    })
}

/// Health routes
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health))
}
