// src/routes/health.rs
//! API health check endpoint for the SOC pipeline service.
//!
//! `GET /health` verifies the process is up and serving requests. It is
//! deliberately lightweight and touches neither the geospatial platform nor
//! the model artifacts. Like its siblings in `routes/`, it exports one
//! subrouter that the gateway (`mod.rs`) merges, so `main.rs` never needs to
//! know about individual endpoints.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handle `GET /health`.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Create a subrouter containing the `/health` route.
///
/// Generic over the application state so it merges cleanly with the gateway
/// router regardless of the state type.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
