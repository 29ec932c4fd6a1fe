//! Handlers for single assets and their version history.
//!
//! The acting user comes from [`RemoteUser`]; asset type path segments are
//! case-insensitive.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use stockpile_core::asset::{normalize_asset_type, Asset, UPDATED_BY};
use stockpile_core::diff::diff_versions;
use stockpile_core::error::CoreError;
use stockpile_core::query::QueryOptions;
use stockpile_core::types::Document;
use stockpile_db::repositories::CreateOptions;

use crate::error::AppResult;
use crate::middleware::remote_user::RemoteUser;
use crate::query::{parse_body, RequestParams, DIFF_PARAM, IMPORT_PARAM};
use crate::response::IdResponse;
use crate::state::AppState;

/// GET /api/v1/{type}/{id}
///
/// The live asset, or the history snapshot given by `?version=N`.
pub async fn get_asset(
    State(state): State<AppState>,
    Path((asset_type, asset_id)): Path<(String, String)>,
    params: RequestParams,
) -> AppResult<impl IntoResponse> {
    let asset_type = normalize_asset_type(&asset_type);
    let version = params.version()?;

    let asset = state.repo.get_asset(&asset_type, &asset_id, version).await?;
    Ok(Json(asset))
}

/// POST /api/v1/{type}/{id}
///
/// Create an asset from the JSON body. Admins may create assets of unknown
/// types; `?import` keeps `created_by`/`updated_by` from the body.
pub async fn create_asset(
    user: RemoteUser,
    State(state): State<AppState>,
    Path((asset_type, asset_id)): Path<(String, String)>,
    params: RequestParams,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let data = parse_body(&body)?;
    let opts = CreateOptions {
        allow_type_creation: user.is_admin,
        import: params.has(IMPORT_PARAM),
    };
    tracing::debug!(user = %user.name, admin = user.is_admin, "Create asset request");

    let asset = Asset::new(normalize_asset_type(&asset_type), asset_id, data);
    let id = state.repo.create_asset(asset, &user.name, opts).await?;

    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

/// PUT /api/v1/{type}/{id}
///
/// Merge the JSON body into the asset, or rewrite it without the fields in
/// `?delete_fields=a,b`.
pub async fn edit_asset(
    user: RemoteUser,
    State(state): State<AppState>,
    Path((asset_type, asset_id)): Path<(String, String)>,
    params: RequestParams,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let data = parse_body(&body)?;
    let delete_fields = params.delete_fields();

    let asset = Asset::new(normalize_asset_type(&asset_type), asset_id, data);
    let id = state
        .repo
        .edit_asset(asset, &user.name, &delete_fields)
        .await?;

    Ok(Json(IdResponse { id }))
}

/// DELETE /api/v1/{type}/{id}
pub async fn delete_asset(
    user: RemoteUser,
    State(state): State<AppState>,
    Path((asset_type, asset_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let asset_type = normalize_asset_type(&asset_type);

    let mut version_meta = Document::new();
    version_meta.insert(UPDATED_BY.into(), Value::from(user.name.as_str()));

    let removed = state
        .repo
        .remove_asset(&asset_type, &asset_id, version_meta)
        .await?;

    Ok(Json(IdResponse { id: removed.id }))
}

/// GET /api/v1/{type}/{id}/versions
///
/// Newest first, at most `?size` history entries plus the live asset. With
/// `?diff` the list is rendered as diffs between consecutive versions.
pub async fn list_versions(
    State(state): State<AppState>,
    Path((asset_type, asset_id)): Path<(String, String)>,
    params: RequestParams,
) -> AppResult<Response> {
    let asset_type = normalize_asset_type(&asset_type);
    let options = QueryOptions::from_params(state.repo.default_result_size(), &params.0)
        .map_err(CoreError::from)?;

    let versions = state
        .repo
        .get_asset_versions(&asset_type, &asset_id, options.size)
        .await?;
    tracing::debug!(
        asset_type = %asset_type,
        asset_id = %asset_id,
        count = versions.len(),
        "Versions loaded"
    );

    if params.has(DIFF_PARAM) && !versions.is_empty() {
        let diffs = diff_versions(&versions)?;
        return Ok(Json(diffs).into_response());
    }
    Ok(Json(versions).into_response())
}
