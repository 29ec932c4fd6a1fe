//! Document store abstraction.
//!
//! A store holds two logical collections: the live collection (one document
//! per `(type, id)`) and the append-only history collection (one snapshot per
//! `(type, id, version)`), plus a registry of known asset types. Backends are
//! a closed set selected at startup through [`StoreFactory`].

use async_trait::async_trait;
use stockpile_core::asset::{AggregatedItem, Asset};
use stockpile_core::error::CoreError;
use stockpile_core::query::StructuredQuery;
use stockpile_core::types::Document;

pub mod factory;
pub mod memory;
pub mod postgres;

pub use factory::{BackendType, OpenedStore, StoreConfig, StoreFactory};
pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

/// Bucket cap used when listing asset types.
pub const MAX_ASSET_TYPES: i64 = 1000;

/// Key inside a type mapping that lists declared properties.
pub const MAPPING_PROPERTIES: &str = "properties";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unknown backend type: {0}")]
    UnknownBackend(String),

    #[error("Store configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Postgres SQLSTATE for an invalid regular expression.
const INVALID_REGEX_SQLSTATE: &str = "2201B";

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => CoreError::not_found("Document", key),
            StoreError::InvalidQuery(msg) => CoreError::Validation(msg),
            StoreError::Database(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(INVALID_REGEX_SQLSTATE) =>
            {
                CoreError::Validation(db_err.message().to_string())
            }
            StoreError::Database(e) => CoreError::Unavailable(e.to_string()),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// Outcome of a live-collection search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    Hits(Vec<Asset>),
    Buckets(Vec<AggregatedItem>),
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

/// Backend-agnostic document storage.
///
/// Every write stamps the stored document with a millisecond epoch
/// timestamp, returned as [`Asset::timestamp`] on reads. Operations are
/// independent: no method spans more than one document atomically.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable.
    async fn ping(&self) -> StoreResult<()>;

    // -- live collection -----------------------------------------------------

    async fn get(&self, asset_type: &str, id: &str) -> StoreResult<Option<Asset>>;

    /// Create or fully replace a live document. Registers the asset type with
    /// an empty mapping if it is not known yet.
    async fn index(&self, asset: &Asset) -> StoreResult<()>;

    /// Shallow-merge `asset.data` into an existing live document.
    ///
    /// Keys in the update overwrite; keys absent from it are kept. Fails with
    /// [`StoreError::NotFound`] if the document does not exist.
    async fn merge(&self, asset: &Asset) -> StoreResult<()>;

    /// Remove a live document. Fails with [`StoreError::NotFound`] if absent.
    async fn delete(&self, asset_type: &str, id: &str) -> StoreResult<()>;

    /// Run a structured query over live documents, optionally within one type.
    async fn search(
        &self,
        asset_type: Option<&str>,
        query: &StructuredQuery,
    ) -> StoreResult<SearchResult>;

    // -- history collection --------------------------------------------------

    /// Write a snapshot at `version`, with `version` set in its data. An
    /// existing snapshot at the same version is left untouched and `false`
    /// is returned.
    async fn put_version(&self, snapshot: &Asset, version: i64) -> StoreResult<bool>;

    async fn get_version(
        &self,
        asset_type: &str,
        id: &str,
        version: i64,
    ) -> StoreResult<Option<Asset>>;

    /// Up to `limit` snapshots of one asset, highest version first.
    async fn list_versions(&self, asset_type: &str, id: &str, limit: i64)
        -> StoreResult<Vec<Asset>>;

    // -- type registry -------------------------------------------------------

    /// Register (or replace) a type's mapping for both collections.
    async fn register_type(&self, asset_type: &str, mapping: &Document) -> StoreResult<()>;

    /// Names of all registered types, sorted.
    async fn registered_types(&self) -> StoreResult<Vec<String>>;

    /// Property names known for a type: declared mapping properties plus every
    /// data key seen on its live documents, sorted and de-duplicated. Fails
    /// with [`StoreError::NotFound`] for a type that is neither registered nor
    /// populated.
    async fn type_properties(&self, asset_type: &str) -> StoreResult<Vec<String>>;
}

/// Declared property names of a mapping (`{"properties": {...}}`).
pub(crate) fn mapping_property_names(mapping: &Document) -> impl Iterator<Item = &String> {
    mapping
        .get(MAPPING_PROPERTIES)
        .and_then(serde_json::Value::as_object)
        .into_iter()
        .flat_map(|props| props.keys())
}

/// Display form of a field value used for aggregation bucket names.
pub(crate) fn bucket_name(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert_matches!(
            CoreError::from(StoreError::NotFound("server.srv1".into())),
            CoreError::NotFound { .. }
        );
        assert_matches!(
            CoreError::from(StoreError::InvalidQuery("bad regex".into())),
            CoreError::Validation(_)
        );
        assert_matches!(
            CoreError::from(StoreError::Database(sqlx::Error::PoolTimedOut)),
            CoreError::Unavailable(_)
        );
        assert_matches!(
            CoreError::from(StoreError::UnknownBackend("es".into())),
            CoreError::Internal(_)
        );
    }

    #[test]
    fn mapping_properties_are_listed() {
        let mapping = json!({"properties": {"os": {"type": "string"}, "cpus": {}}});
        let names: Vec<&String> = mapping_property_names(mapping.as_object().unwrap()).collect();
        assert_eq!(names, vec!["cpus", "os"]);
    }

    #[test]
    fn bucket_names_use_plain_text() {
        assert_eq!(bucket_name(&json!("linux")), "linux");
        assert_eq!(bucket_name(&json!(4)), "4");
        assert_eq!(bucket_name(&json!(true)), "true");
    }
}
