use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::handlers;
use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the datastore does not answer.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Configured backend name.
    pub datastore: &'static str,
    pub datastore_healthy: bool,
}

/// GET /health -- returns service and datastore health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let datastore_healthy = match state.repo.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Datastore health check failed");
            false
        }
    };

    let status = if datastore_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        datastore: state.repo.backend_name(),
        datastore_healthy,
    })
}

/// Root-level service routes (not under the API prefix).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/config", get(handlers::config::get_config))
}
