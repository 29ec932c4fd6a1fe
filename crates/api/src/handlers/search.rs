//! Query endpoints over live assets.
//!
//! Filters come from the query string (repeated keys joined with `|`) and an
//! optional JSON body; body keys win. `sort`, `from`, `size` and `aggregate`
//! are options, not filters.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use stockpile_core::asset::normalize_asset_type;
use stockpile_core::query::{filter_params, merge_body};
use stockpile_db::repositories::QueryResult;

use crate::error::AppResult;
use crate::query::{parse_body, RequestParams};
use crate::state::AppState;

/// GET /api/v1/search
pub async fn search_all(
    State(state): State<AppState>,
    params: RequestParams,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let result = run_query(&state, None, &params, &body).await?;
    Ok(Json(result))
}

/// GET /api/v1/{type}
pub async fn search_type(
    State(state): State<AppState>,
    Path(asset_type): Path<String>,
    params: RequestParams,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let asset_type = normalize_asset_type(&asset_type);
    let result = run_query(&state, Some(&asset_type), &params, &body).await?;
    Ok(Json(result))
}

async fn run_query(
    state: &AppState,
    asset_type: Option<&str>,
    params: &RequestParams,
    body: &Bytes,
) -> AppResult<QueryResult> {
    let mut filters = filter_params(&params.0);
    merge_body(&mut filters, parse_body(body)?);

    Ok(state
        .repo
        .execute_query(asset_type, &filters, &params.0)
        .await?)
}
