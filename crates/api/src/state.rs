use std::sync::Arc;

use stockpile_db::repositories::AssetRepo;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Asset lifecycle over the configured document store.
    pub repo: AssetRepo,
    pub config: Arc<ServerConfig>,
}
