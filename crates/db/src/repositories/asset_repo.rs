//! Asset lifecycle and version bookkeeping over a [`DocumentStore`].
//!
//! Read-modify-write sequences here (existence check before create, fetch
//! before edit/delete, latest-version lookup before a snapshot) are separate
//! store calls with no concurrency token. Two concurrent edits of the same
//! asset can interleave; the later snapshot write at an already-used version
//! is dropped by the store.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use stockpile_core::asset::{
    validate_asset_id, validate_asset_type, AggregatedItem, Asset, ResourceType, CREATED_BY,
    CREATED_ON, UPDATED_BY,
};
use stockpile_core::error::CoreError;
use stockpile_core::event::{AssetEvent, EventKind, EventSender};
use stockpile_core::query::{build_query, ParamMap, StructuredQuery, ResultWindow, TYPE_FIELD};
use stockpile_core::schema::AssetTypeSchema;
use stockpile_core::types::{now_millis, Document};
use stockpile_core::version::{document_version, FIRST_VERSION};

use crate::store::{DocumentStore, SearchResult, StoreError, MAPPING_PROPERTIES, MAX_ASSET_TYPES};

/// Flags for [`AssetRepo::create_asset`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    /// Allow an asset of a type that is not registered yet; the type is
    /// registered implicitly.
    pub allow_type_creation: bool,
    /// `created_by` / `updated_by` come from the payload instead of the
    /// acting user.
    pub import: bool,
}

/// Result of [`AssetRepo::execute_query`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Assets(Vec<Asset>),
    Aggregated(Vec<AggregatedItem>),
}

/// Orchestrates asset CRUD, history snapshots, and domain events.
#[derive(Clone)]
pub struct AssetRepo {
    store: Arc<dyn DocumentStore>,
    schema: Arc<AssetTypeSchema>,
    default_result_size: i64,
    events: EventSender,
}

impl AssetRepo {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        schema: AssetTypeSchema,
        default_result_size: i64,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            schema: Arc::new(schema),
            default_result_size,
            events,
        }
    }

    pub fn schema(&self) -> &AssetTypeSchema {
        &self.schema
    }

    pub fn default_result_size(&self) -> i64 {
        self.default_result_size
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Check store connectivity.
    pub async fn ping(&self) -> Result<(), CoreError> {
        self.store.ping().await.map_err(CoreError::from)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Create a new live asset and return its id.
    pub async fn create_asset(
        &self,
        mut asset: Asset,
        user: &str,
        opts: CreateOptions,
    ) -> Result<String, CoreError> {
        validate_asset_type(&asset.asset_type)?;

        if opts.import {
            for field in [CREATED_BY, UPDATED_BY] {
                if asset.data_str(field).is_none() {
                    return Err(CoreError::Validation(format!(
                        "`{field}` field required for import"
                    )));
                }
            }
        } else {
            asset.data.insert(CREATED_BY.into(), Value::from(user));
            asset.data.insert(UPDATED_BY.into(), Value::from(user));
        }

        let type_exists = self.type_exists(&asset.asset_type).await?;
        if !type_exists && !opts.allow_type_creation {
            return Err(CoreError::not_found("Asset type", asset.asset_type.clone()));
        }

        validate_asset_id(&asset.id)?;
        self.schema.validate_enforced(&asset.data)?;
        self.schema.validate_required(&asset.data)?;

        if self.store.get(&asset.asset_type, &asset.id).await?.is_some() {
            return Err(CoreError::Conflict(format!(
                "Asset already exists: {}",
                asset.subject()
            )));
        }

        asset.data.insert(CREATED_ON.into(), Value::from(now_millis()));
        self.store.index(&asset).await?;

        tracing::info!(
            asset_type = %asset.asset_type,
            asset_id = %asset.id,
            user,
            import = opts.import,
            "Asset created"
        );

        if !type_exists {
            tracing::info!(asset_type = %asset.asset_type, "Asset type created implicitly");
            self.events
                .publish(AssetEvent::for_type(EventKind::Created, &asset.asset_type))
                .await;
        }
        self.events
            .publish(AssetEvent::for_asset(EventKind::Created, &asset))
            .await;

        Ok(asset.id)
    }

    /// Update a live asset and snapshot its pre-edit state.
    ///
    /// With `delete_fields` the current document is merged under the payload,
    /// the fields are removed, and the result replaces the document. Without
    /// them the payload is merged into the stored document.
    pub async fn edit_asset(
        &self,
        mut asset: Asset,
        user: &str,
        delete_fields: &[String],
    ) -> Result<String, CoreError> {
        if asset.data.is_empty() && delete_fields.is_empty() {
            return Err(CoreError::Validation(
                "Edit requires data or fields to delete".into(),
            ));
        }

        asset.data.remove(CREATED_BY);
        asset.data.insert(UPDATED_BY.into(), Value::from(user));

        self.schema.check_deletable(delete_fields)?;
        self.schema.validate_enforced(&asset.data)?;

        asset.data.remove(CREATED_ON);

        let current = self
            .store
            .get(&asset.asset_type, &asset.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Asset", asset.subject()))?;

        if delete_fields.is_empty() {
            self.store.merge(&asset).await?;
        } else {
            tracing::debug!(
                asset_type = %asset.asset_type,
                asset_id = %asset.id,
                fields = ?delete_fields,
                "Deleting fields with full replace"
            );
            for (key, value) in &current.data {
                if !asset.data.contains_key(key) {
                    asset.data.insert(key.clone(), value.clone());
                }
            }
            for field in delete_fields {
                asset.data.remove(field);
            }
            self.store.index(&asset).await?;
        }

        if let Err(e) = self.create_asset_version(&current).await {
            tracing::error!(
                asset_type = %asset.asset_type,
                asset_id = %asset.id,
                error = %e,
                "Failed to snapshot pre-edit version"
            );
        }

        self.events
            .publish(AssetEvent::for_asset(EventKind::Updated, &asset))
            .await;

        Ok(asset.id)
    }

    /// Delete a live asset, snapshot it, and write a tombstone.
    ///
    /// The tombstone is an empty-data snapshot one version above the
    /// pre-delete snapshot, carrying `version_meta` (e.g. `updated_by`).
    /// Returns the asset as it was before deletion.
    pub async fn remove_asset(
        &self,
        asset_type: &str,
        id: &str,
        version_meta: Document,
    ) -> Result<Asset, CoreError> {
        let current = self
            .store
            .get(asset_type, id)
            .await?
            .ok_or_else(|| CoreError::not_found("Asset", format!("{asset_type}.{id}")))?;

        self.store.delete(asset_type, id).await?;

        let version = self.create_asset_version(&current).await?;

        let mut tombstone = Asset::new(asset_type, id, version_meta);
        tombstone.timestamp = Some(Value::from(now_millis()));
        if !self.store.put_version(&tombstone, version + 1).await? {
            tracing::warn!(
                asset_type,
                asset_id = id,
                version = version + 1,
                "Tombstone version already exists, tombstone dropped"
            );
        }

        tracing::info!(
            asset_type,
            asset_id = id,
            version,
            tombstone_version = version + 1,
            "Asset removed"
        );

        self.events
            .publish(AssetEvent::for_asset(EventKind::Deleted, &current))
            .await;

        Ok(current)
    }

    /// Snapshot `asset` into history at the next version and return it.
    ///
    /// A failed history lookup is logged and treated as "no history": the
    /// snapshot is written as version 1. An unparseable stored version is an
    /// error. When the version is already taken (a concurrent edit, or the
    /// fallback above colliding with real history) the snapshot is dropped
    /// with a warning and the version is still returned.
    pub async fn create_asset_version(&self, asset: &Asset) -> Result<i64, CoreError> {
        let latest = match self
            .store
            .list_versions(&asset.asset_type, &asset.id, 1)
            .await
        {
            Ok(snapshots) => snapshots.into_iter().next(),
            Err(e) => {
                tracing::warn!(
                    asset_type = %asset.asset_type,
                    asset_id = %asset.id,
                    error = %e,
                    "History lookup failed, starting at the first version"
                );
                None
            }
        };

        let version = match latest {
            Some(snapshot) => document_version(&snapshot.data)? + 1,
            None => FIRST_VERSION,
        };

        if self.store.put_version(asset, version).await? {
            tracing::info!(
                asset_type = %asset.asset_type,
                asset_id = %asset.id,
                version,
                "Version created"
            );
        } else {
            tracing::warn!(
                asset_type = %asset.asset_type,
                asset_id = %asset.id,
                version,
                "Snapshot version already exists, snapshot dropped"
            );
        }
        Ok(version)
    }

    /// Validate a type name and register it with an optional mapping.
    pub async fn create_asset_type(
        &self,
        asset_type: &str,
        mapping: Option<Document>,
    ) -> Result<(), CoreError> {
        validate_asset_type(asset_type)?;

        let mapping = match mapping {
            Some(m) if !m.is_empty() => m,
            _ => {
                let mut m = Document::new();
                m.insert(MAPPING_PROPERTIES.into(), Value::Object(Document::new()));
                m
            }
        };
        self.store.register_type(asset_type, &mapping).await?;

        tracing::info!(asset_type, "Asset type registered");
        self.events
            .publish(AssetEvent::for_type(EventKind::Created, asset_type))
            .await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Live asset for `version <= 0`, otherwise the history snapshot.
    pub async fn get_asset(
        &self,
        asset_type: &str,
        id: &str,
        version: i64,
    ) -> Result<Asset, CoreError> {
        if version <= 0 {
            self.store
                .get(asset_type, id)
                .await?
                .ok_or_else(|| CoreError::not_found("Asset", format!("{asset_type}.{id}")))
        } else {
            self.store
                .get_version(asset_type, id, version)
                .await?
                .ok_or_else(|| {
                    CoreError::not_found("Asset version", format!("{asset_type}.{id}.{version}"))
                })
        }
    }

    /// Up to `count` history snapshots, newest first, preceded by the live
    /// asset numbered one above the newest snapshot (or 1 without history).
    ///
    /// A failed history read yields an empty list. Without a live document
    /// (deleted asset) only the history is returned. A newest snapshot whose
    /// version cannot be read is a validation error.
    pub async fn get_asset_versions(
        &self,
        asset_type: &str,
        id: &str,
        count: i64,
    ) -> Result<Vec<Asset>, CoreError> {
        let history = match self.store.list_versions(asset_type, id, count).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(asset_type, asset_id = id, error = %e, "Version lookup failed");
                return Ok(Vec::new());
            }
        };

        let current = match self.store.get(asset_type, id).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                tracing::debug!(asset_type, asset_id = id, "No current version");
                return Ok(history);
            }
            Err(e) => {
                tracing::warn!(asset_type, asset_id = id, error = %e, "No current version");
                return Ok(history);
            }
        };

        let next = match history.first() {
            Some(newest) => document_version(&newest.data)? + 1,
            None => FIRST_VERSION,
        };

        let mut current = current;
        current.set_version(next);

        let mut versions = Vec::with_capacity(history.len() + 1);
        versions.push(current);
        versions.extend(history);
        Ok(versions)
    }

    /// Types with live document counts, plus registered types with none.
    pub async fn list_asset_types(&self) -> Result<Vec<ResourceType>, CoreError> {
        let query = StructuredQuery {
            predicates: Vec::new(),
            sort: Vec::new(),
            window: ResultWindow::Aggregate {
                field: TYPE_FIELD.to_string(),
                buckets: MAX_ASSET_TYPES,
            },
        };
        let counted = match self.store.search(None, &query).await? {
            SearchResult::Buckets(items) => items,
            SearchResult::Hits(_) => Vec::new(),
        };

        let seen: BTreeSet<String> = counted.iter().map(|i| i.name.clone()).collect();
        let mut types: Vec<ResourceType> = counted.into_iter().map(ResourceType::from).collect();
        for name in self.store.registered_types().await? {
            if !seen.contains(&name) {
                types.push(ResourceType { name, count: 0 });
            }
        }
        Ok(types)
    }

    /// Property names known for a type.
    pub async fn type_properties(&self, asset_type: &str) -> Result<Vec<String>, CoreError> {
        match self.store.type_properties(asset_type).await {
            Ok(names) => Ok(names),
            Err(StoreError::NotFound(_)) => Err(CoreError::not_found("Asset type", asset_type)),
            Err(e) => Err(e.into()),
        }
    }

    /// Translate request filters and options, then search live assets.
    pub async fn execute_query(
        &self,
        asset_type: Option<&str>,
        filters: &Document,
        params: &ParamMap,
    ) -> Result<QueryResult, CoreError> {
        let query = build_query(filters, params, self.default_result_size)?;
        tracing::debug!(
            asset_type = asset_type.unwrap_or("*"),
            match_all = query.is_match_all(),
            aggregate = query.aggregate_field().unwrap_or("-"),
            query = ?query,
            "Executing query"
        );

        Ok(match self.store.search(asset_type, &query).await? {
            SearchResult::Hits(assets) => QueryResult::Assets(assets),
            SearchResult::Buckets(items) => QueryResult::Aggregated(items),
        })
    }

    async fn type_exists(&self, asset_type: &str) -> Result<bool, CoreError> {
        Ok(self
            .store
            .registered_types()
            .await?
            .iter()
            .any(|t| t == asset_type))
    }
}
