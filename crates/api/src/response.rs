//! Small response bodies shared by the write endpoints.
//!
//! Read endpoints return domain types directly (assets, type counts,
//! diffs); only acknowledgements need a dedicated shape.

use serde::Serialize;

/// `{"id": ...}` returned after creating, editing or deleting an asset.
#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: String,
}

/// `{"status": "success"}` returned after registering an asset type.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self { status: "success" }
    }
}
