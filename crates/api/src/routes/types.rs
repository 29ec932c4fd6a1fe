use axum::routing::{get, post};
use axum::Router;

use crate::handlers::types;
use crate::state::AppState;

/// Asset type routes.
///
/// ```text
/// GET    /types                         -> list_types
/// POST   /types/{type}                  -> create_type (admin only)
/// GET    /types/{type}/properties       -> type_properties
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/types", get(types::list_types))
        .route("/types/{asset_type}", post(types::create_type))
        .route("/types/{asset_type}/properties", get(types::type_properties))
}
