//! Version-number coercion for history snapshots.
//!
//! Snapshots written by older clients or other tooling may carry the
//! `version` field as an integer, a float, or a numeric string. Every path
//! that reads a version goes through [`parse_version`].

use serde_json::Value;

use crate::error::CoreError;
use crate::types::Document;

/// Data key holding a snapshot's generation number.
pub const VERSION_FIELD: &str = "version";

/// First version number assigned to an asset's history.
pub const FIRST_VERSION: i64 = 1;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VersionError {
    #[error("Snapshot has no `version` field")]
    Missing,

    #[error("Could not parse version: {0}")]
    Unparseable(String),
}

impl From<VersionError> for CoreError {
    fn from(err: VersionError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

/// Coerce a JSON value into a version number.
///
/// Integers are taken as-is, floats are truncated toward zero, and strings
/// must hold a base-10 integer. Anything else (including `null`) fails.
pub fn parse_version(value: &Value) -> Result<i64, VersionError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(u) = n.as_u64() {
                i64::try_from(u).map_err(|_| VersionError::Unparseable(n.to_string()))
            } else {
                n.as_f64()
                    .map(|f| f.trunc() as i64)
                    .ok_or_else(|| VersionError::Unparseable(n.to_string()))
            }
        }
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| VersionError::Unparseable(s.clone())),
        other => Err(VersionError::Unparseable(other.to_string())),
    }
}

/// Read the `version` field of a document.
pub fn document_version(data: &Document) -> Result<i64, VersionError> {
    data.get(VERSION_FIELD)
        .ok_or(VersionError::Missing)
        .and_then(parse_version)
}
