use axum::routing::get;
use axum::Router;

use crate::handlers::{assets, search};
use crate::state::AppState;

/// Asset routes mounted at the API root.
///
/// ```text
/// GET    /search                 -> search_all
/// GET    /{type}                 -> search_type
/// GET    /{type}/{id}            -> get_asset (?version=N)
/// POST   /{type}/{id}            -> create_asset (?import)
/// PUT    /{type}/{id}            -> edit_asset (?delete_fields=a,b)
/// DELETE /{type}/{id}            -> delete_asset
/// GET    /{type}/{id}/versions   -> list_versions (?size=N, ?diff)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", get(search::search_all))
        .route("/{asset_type}", get(search::search_type))
        .route(
            "/{asset_type}/{asset_id}",
            get(assets::get_asset)
                .post(assets::create_asset)
                .put(assets::edit_asset)
                .delete(assets::delete_asset),
        )
        .route("/{asset_type}/{asset_id}/versions", get(assets::list_versions))
}
