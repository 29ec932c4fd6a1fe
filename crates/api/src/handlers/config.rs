//! Client-facing service configuration.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use stockpile_core::schema::AssetTypeSchema;

use crate::state::AppState;

/// What a client needs to talk to this service.
#[derive(Debug, Serialize)]
pub struct ClientConfig {
    pub version: &'static str,
    pub api_prefix: String,
    pub datastore: &'static str,
    pub default_result_size: i64,
    /// Field rules applied to every asset.
    pub asset: AssetTypeSchema,
}

/// GET /config
pub async fn get_config(State(state): State<AppState>) -> Json<ClientConfig> {
    Json(ClientConfig {
        version: env!("CARGO_PKG_VERSION"),
        api_prefix: state.config.api_prefix.clone(),
        datastore: state.repo.backend_name(),
        default_result_size: state.repo.default_result_size(),
        asset: state.repo.schema().clone(),
    })
}
