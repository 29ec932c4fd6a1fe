//! Handlers for asset types.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use stockpile_core::asset::normalize_asset_type;

use crate::error::AppResult;
use crate::middleware::remote_user::RequireAdmin;
use crate::query::parse_body;
use crate::response::StatusResponse;
use crate::state::AppState;

/// GET /api/v1/types
///
/// Every type with its live asset count, including registered types that
/// have no assets.
pub async fn list_types(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let types = state.repo.list_asset_types().await?;
    Ok(Json(types))
}

/// POST /api/v1/types/{type}
///
/// Register a type. The optional body is its mapping, e.g.
/// `{"properties": {"rack": {"type": "string"}}}`. Admin only.
pub async fn create_type(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(asset_type): Path<String>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let asset_type = normalize_asset_type(&asset_type);
    let mapping = Some(parse_body(&body)?).filter(|m| !m.is_empty());

    state.repo.create_asset_type(&asset_type, mapping).await?;
    tracing::info!(asset_type = %asset_type, user = %admin.name, "Asset type created");

    Ok(Json(StatusResponse::success()))
}

/// GET /api/v1/types/{type}/properties
pub async fn type_properties(
    State(state): State<AppState>,
    Path(asset_type): Path<String>,
) -> AppResult<impl IntoResponse> {
    let asset_type = normalize_asset_type(&asset_type);
    let properties = state.repo.type_properties(&asset_type).await?;
    Ok(Json(properties))
}
