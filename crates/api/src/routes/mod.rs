pub mod assets;
pub mod health;
pub mod types;

use axum::Router;

use crate::state::AppState;

/// Build the asset API route tree (mounted under `API_PREFIX`).
///
/// Route hierarchy:
///
/// ```text
/// /types                                   list types with counts
/// /types/{type}                            register type (POST, admin)
/// /types/{type}/properties                 known property names
///
/// /search                                  query across all types
/// /{type}                                  query within a type
/// /{type}/{id}                             get, create, edit, delete
/// /{type}/{id}/versions                    version history (?diff)
/// ```
///
/// `/types` and `/search` are static segments and take precedence over an
/// asset type of the same name.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(types::router())
        .merge(assets::router())
}
