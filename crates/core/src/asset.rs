//! Asset model, identifier rules, and aggregation result types.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::types::Document;
use crate::version::{parse_version, VERSION_FIELD};

// ---------------------------------------------------------------------------
// Managed data fields
// ---------------------------------------------------------------------------

pub const CREATED_BY: &str = "created_by";
pub const UPDATED_BY: &str = "updated_by";
pub const CREATED_ON: &str = "created_on";

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

const ASSET_ID_PATTERN: &str = r"^[a-zA-Z0-9:_(){}|\-.]+$";
const ASSET_TYPE_PATTERN: &str = r"^[a-z0-9\-_]+$";

static ASSET_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ASSET_ID_PATTERN).expect("valid regex"));
static ASSET_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ASSET_TYPE_PATTERN).expect("valid regex"));

/// Validate an asset id against the allowed character set.
pub fn validate_asset_id(id: &str) -> Result<(), CoreError> {
    if !ASSET_ID_RE.is_match(id) {
        return Err(CoreError::Validation(format!(
            "Invalid characters in id: '{id}'"
        )));
    }
    Ok(())
}

/// Validate an asset type name (lowercase alphanumerics, `-` and `_`).
pub fn validate_asset_type(asset_type: &str) -> Result<(), CoreError> {
    if !ASSET_TYPE_RE.is_match(asset_type) {
        return Err(CoreError::Validation(format!(
            "Invalid characters in type: '{asset_type}'"
        )));
    }
    Ok(())
}

/// Normalize a user-supplied asset type (path segments are case-insensitive).
pub fn normalize_asset_type(asset_type: &str) -> String {
    asset_type.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A typed, schema-flexible record.
///
/// `timestamp` is assigned by the store on every write and is ignored when
/// supplied by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,

    #[serde(rename = "type")]
    pub asset_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,

    #[serde(default)]
    pub data: Document,
}

impl Asset {
    pub fn new(asset_type: impl Into<String>, id: impl Into<String>, data: Document) -> Self {
        Self {
            id: id.into(),
            asset_type: asset_type.into(),
            timestamp: None,
            data,
        }
    }

    /// Snapshot version carried in `data`, if present and parseable.
    pub fn version(&self) -> Option<i64> {
        self.data
            .get(VERSION_FIELD)
            .and_then(|v| parse_version(v).ok())
    }

    /// Set the snapshot version in `data`.
    pub fn set_version(&mut self, version: i64) {
        self.data.insert(VERSION_FIELD.into(), Value::from(version));
    }

    /// `{type}.{id}`, used as the event subject.
    pub fn subject(&self) -> String {
        format!("{}.{}", self.asset_type, self.id)
    }

    /// Non-blank string value of a data field.
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Aggregations
// ---------------------------------------------------------------------------

/// Count of documents sharing one value of an aggregated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedItem {
    pub name: String,
    pub count: i64,
}

/// An asset type with its live document count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    pub name: String,
    pub count: i64,
}

impl From<AggregatedItem> for ResourceType {
    fn from(item: AggregatedItem) -> Self {
        Self {
            name: item.name,
            count: item.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn id_accepts_allowed_punctuation() {
        assert!(validate_asset_id("host-01.prod:{a}|(b)_c").is_ok());
    }

    #[test]
    fn id_rejects_spaces_and_slashes() {
        assert_matches!(validate_asset_id("bad id"), Err(CoreError::Validation(_)));
        assert_matches!(validate_asset_id("a/b"), Err(CoreError::Validation(_)));
        assert_matches!(validate_asset_id(""), Err(CoreError::Validation(_)));
    }

    #[test]
    fn type_must_be_lowercase_kebab() {
        assert!(validate_asset_type("virtual-server_2").is_ok());
        assert_matches!(validate_asset_type("Server"), Err(CoreError::Validation(_)));
        assert_matches!(validate_asset_type("a.b"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn normalize_lowercases() {
        assert_eq!(normalize_asset_type(" Server "), "server");
    }

    #[test]
    fn wire_shape_uses_type_key_and_omits_missing_timestamp() {
        let mut data = Document::new();
        data.insert("status".into(), json!("enabled"));
        let asset = Asset::new("server", "srv1", data);

        let value = serde_json::to_value(&asset).unwrap();
        assert_eq!(
            value,
            json!({"id": "srv1", "type": "server", "data": {"status": "enabled"}})
        );
    }

    #[test]
    fn deserializes_without_data() {
        let asset: Asset = serde_json::from_value(json!({"id": "a", "type": "t"})).unwrap();
        assert!(asset.data.is_empty());
        assert!(asset.timestamp.is_none());
    }

    #[test]
    fn version_accessors() {
        let mut asset = Asset::new("server", "srv1", Document::new());
        assert_eq!(asset.version(), None);
        asset.set_version(5);
        assert_eq!(asset.version(), Some(5));
        assert_eq!(asset.data[VERSION_FIELD], json!(5));
    }

    #[test]
    fn data_str_ignores_blank_values() {
        let mut data = Document::new();
        data.insert(CREATED_BY.into(), json!("  "));
        data.insert(UPDATED_BY.into(), json!("alice"));
        let asset = Asset::new("server", "srv1", data);
        assert_eq!(asset.data_str(CREATED_BY), None);
        assert_eq!(asset.data_str(UPDATED_BY), Some("alice"));
    }
}
