//! Postgres document store.
//!
//! Documents live in JSONB columns (`assets`, `asset_versions`); the type
//! registry is `asset_types`. Structured queries are rendered with
//! [`QueryBuilder`], binding every field name and value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use stockpile_core::asset::{AggregatedItem, Asset};
use stockpile_core::query::{
    anchored_pattern, FilterPredicate, RangeOp, ResultWindow, SortOrder, StructuredQuery,
    PRIMARY_KEY_FIELD, TYPE_FIELD,
};
use stockpile_core::types::Document;
use stockpile_core::version::VERSION_FIELD;

use super::{mapping_property_names, DocumentStore, SearchResult, StoreError, StoreResult};

/// Column list for `assets` reads.
const ASSET_COLUMNS: &str = "asset_type, asset_id, data, \
     (EXTRACT(EPOCH FROM updated_at) * 1000)::bigint AS ts";

/// Column list for `asset_versions` reads.
const VERSION_COLUMNS: &str = "asset_type, asset_id, data, \
     (EXTRACT(EPOCH FROM recorded_at) * 1000)::bigint AS ts";

#[derive(Debug, FromRow)]
struct DocRow {
    asset_type: String,
    asset_id: String,
    data: Json<Document>,
    ts: i64,
}

impl From<DocRow> for Asset {
    fn from(row: DocRow) -> Self {
        let mut asset = Asset::new(row.asset_type, row.asset_id, row.data.0);
        asset.timestamp = Some(Value::from(row.ts));
        asset
    }
}

#[derive(Debug, FromRow)]
struct BucketRow {
    name: String,
    count: i64,
}

/// Postgres-backed [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// SQL rendering
// ---------------------------------------------------------------------------

/// Column backing a reserved dimension, if `field` is one.
fn dimension_column(field: &str) -> Option<&'static str> {
    match field {
        PRIMARY_KEY_FIELD => Some("asset_id"),
        TYPE_FIELD => Some("asset_type"),
        _ => None,
    }
}

/// `data -> field` as a set of elements: the array's items, or the value
/// itself for scalars.
fn push_elements_of(qb: &mut QueryBuilder<'_, Postgres>, field: &str) {
    qb.push("jsonb_array_elements(CASE WHEN jsonb_typeof(data -> ");
    qb.push_bind(field.to_string());
    qb.push(") = 'array' THEN data -> ");
    qb.push_bind(field.to_string());
    qb.push(" ELSE jsonb_build_array(data -> ");
    qb.push_bind(field.to_string());
    qb.push(") END)");
}

fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, pred: &FilterPredicate) {
    if let Some(column) = dimension_column(pred.field()) {
        match pred {
            FilterPredicate::Term { value, .. } => {
                qb.push(column).push(" = ").push_bind(value.clone());
            }
            FilterPredicate::Regex { pattern, .. } => {
                qb.push(column)
                    .push(" ~ ")
                    .push_bind(anchored_pattern(pattern));
            }
            FilterPredicate::Range { .. } => {
                qb.push("false");
            }
        }
        return;
    }

    qb.push("EXISTS (SELECT 1 FROM ");
    push_elements_of(qb, pred.field());
    qb.push(" AS v(elem) WHERE ");
    match pred {
        FilterPredicate::Term { value, .. } => {
            qb.push("elem #>> '{}' = ").push_bind(value.clone());
        }
        FilterPredicate::Range { op, value, .. } => {
            let cmp = match op {
                RangeOp::Gt => " > ",
                RangeOp::Lt => " < ",
            };
            qb.push("CASE WHEN jsonb_typeof(elem) = 'number' THEN (elem #>> '{}')::float8")
                .push(cmp)
                .push_bind(value.as_f64())
                .push(" ELSE false END");
        }
        FilterPredicate::Regex { pattern, .. } => {
            qb.push("jsonb_typeof(elem) IN ('string', 'number', 'boolean') AND (elem #>> '{}') ~ ")
                .push_bind(anchored_pattern(pattern));
        }
    }
    qb.push(")");
}

/// `AND`-joined WHERE clauses after a leading `WHERE true`.
fn push_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    asset_type: Option<&str>,
    predicates: &[FilterPredicate],
) {
    if let Some(t) = asset_type {
        qb.push(" AND asset_type = ").push_bind(t.to_string());
    }
    for pred in predicates {
        qb.push(" AND ");
        push_predicate(qb, pred);
    }
}

fn push_order_by(qb: &mut QueryBuilder<'_, Postgres>, query: &StructuredQuery) {
    qb.push(" ORDER BY ");
    for key in &query.sort {
        match dimension_column(&key.field) {
            Some(column) => {
                qb.push(column);
            }
            None => {
                qb.push("data -> ").push_bind(key.field.clone());
            }
        }
        qb.push(match key.order {
            SortOrder::Asc => " ASC NULLS LAST, ",
            SortOrder::Desc => " DESC NULLS LAST, ",
        });
    }
    qb.push("asset_type, asset_id");
}

fn build_search<'a>(asset_type: Option<&str>, query: &StructuredQuery) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new("");
    match &query.window {
        ResultWindow::Aggregate { field, buckets } => {
            match dimension_column(field) {
                Some(column) => {
                    qb.push(format!(
                        "SELECT {column} AS name, COUNT(*)::bigint AS count FROM assets WHERE true"
                    ));
                }
                None => {
                    qb.push("SELECT bucket.name, COUNT(*)::bigint AS count FROM assets CROSS JOIN LATERAL ");
                    qb.push("jsonb_array_elements_text(CASE WHEN jsonb_typeof(data -> ");
                    qb.push_bind(field.clone());
                    qb.push(") = 'array' THEN data -> ");
                    qb.push_bind(field.clone());
                    qb.push(" ELSE jsonb_build_array(data -> ");
                    qb.push_bind(field.clone());
                    qb.push(") END) AS bucket(name) WHERE bucket.name IS NOT NULL");
                }
            }
            push_filters(&mut qb, asset_type, &query.predicates);
            qb.push(" GROUP BY 1 ORDER BY 2 DESC, 1 ASC LIMIT ")
                .push_bind(*buckets);
        }
        ResultWindow::Page { from, size } => {
            qb.push(format!("SELECT {ASSET_COLUMNS} FROM assets WHERE true"));
            push_filters(&mut qb, asset_type, &query.predicates);
            push_order_by(&mut qb, query);
            qb.push(" LIMIT ")
                .push_bind(*size)
                .push(" OFFSET ")
                .push_bind(*from);
        }
    }
    qb
}

// ---------------------------------------------------------------------------
// DocumentStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StoreResult<()> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, asset_type: &str, id: &str) -> StoreResult<Option<Asset>> {
        let query =
            format!("SELECT {ASSET_COLUMNS} FROM assets WHERE asset_type = $1 AND asset_id = $2");
        let row = sqlx::query_as::<_, DocRow>(&query)
            .bind(asset_type)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Asset::from))
    }

    async fn index(&self, asset: &Asset) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO asset_types (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(&asset.asset_type)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO assets (asset_type, asset_id, data, updated_at) \
             VALUES ($1, $2, $3, now()) \
             ON CONFLICT (asset_type, asset_id) \
             DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
        )
        .bind(&asset.asset_type)
        .bind(&asset.id)
        .bind(Json(&asset.data))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn merge(&self, asset: &Asset) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE assets SET data = data || $3, updated_at = now() \
             WHERE asset_type = $1 AND asset_id = $2",
        )
        .bind(&asset.asset_type)
        .bind(&asset.id)
        .bind(Json(&asset.data))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(asset.subject()));
        }
        Ok(())
    }

    async fn delete(&self, asset_type: &str, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM assets WHERE asset_type = $1 AND asset_id = $2")
            .bind(asset_type)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{asset_type}.{id}")));
        }
        Ok(())
    }

    async fn search(
        &self,
        asset_type: Option<&str>,
        query: &StructuredQuery,
    ) -> StoreResult<SearchResult> {
        let mut qb = build_search(asset_type, query);
        tracing::trace!(sql = qb.sql(), "Executing search");

        match query.window {
            ResultWindow::Aggregate { .. } => {
                let rows: Vec<BucketRow> = qb.build_query_as().fetch_all(&self.pool).await?;
                Ok(SearchResult::Buckets(
                    rows.into_iter()
                        .map(|r| AggregatedItem {
                            name: r.name,
                            count: r.count,
                        })
                        .collect(),
                ))
            }
            ResultWindow::Page { .. } => {
                let rows: Vec<DocRow> = qb.build_query_as().fetch_all(&self.pool).await?;
                Ok(SearchResult::Hits(rows.into_iter().map(Asset::from).collect()))
            }
        }
    }

    async fn put_version(&self, snapshot: &Asset, version: i64) -> StoreResult<bool> {
        let mut data = snapshot.data.clone();
        data.insert(VERSION_FIELD.into(), Value::from(version));
        let recorded_at = snapshot
            .timestamp
            .as_ref()
            .and_then(Value::as_i64)
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        let result = sqlx::query(
            "INSERT INTO asset_versions (asset_type, asset_id, version, data, recorded_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (asset_type, asset_id, version) DO NOTHING",
        )
        .bind(&snapshot.asset_type)
        .bind(&snapshot.id)
        .bind(version)
        .bind(Json(&data))
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_version(
        &self,
        asset_type: &str,
        id: &str,
        version: i64,
    ) -> StoreResult<Option<Asset>> {
        let query = format!(
            "SELECT {VERSION_COLUMNS} FROM asset_versions \
             WHERE asset_type = $1 AND asset_id = $2 AND version = $3"
        );
        let row = sqlx::query_as::<_, DocRow>(&query)
            .bind(asset_type)
            .bind(id)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Asset::from))
    }

    async fn list_versions(
        &self,
        asset_type: &str,
        id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Asset>> {
        let query = format!(
            "SELECT {VERSION_COLUMNS} FROM asset_versions \
             WHERE asset_type = $1 AND asset_id = $2 \
             ORDER BY version DESC LIMIT $3"
        );
        let rows = sqlx::query_as::<_, DocRow>(&query)
            .bind(asset_type)
            .bind(id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Asset::from).collect())
    }

    async fn register_type(&self, asset_type: &str, mapping: &Document) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO asset_types (name, mapping) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET mapping = EXCLUDED.mapping",
        )
        .bind(asset_type)
        .bind(Json(mapping))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn registered_types(&self) -> StoreResult<Vec<String>> {
        let names = sqlx::query_scalar("SELECT name FROM asset_types ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn type_properties(&self, asset_type: &str) -> StoreResult<Vec<String>> {
        let mapping: Option<Json<Document>> =
            sqlx::query_scalar("SELECT mapping FROM asset_types WHERE name = $1")
                .bind(asset_type)
                .fetch_optional(&self.pool)
                .await?;
        let populated: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM assets WHERE asset_type = $1)")
                .bind(asset_type)
                .fetch_one(&self.pool)
                .await?;
        if mapping.is_none() && !populated {
            return Err(StoreError::NotFound(asset_type.to_string()));
        }

        let mut names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT jsonb_object_keys(data) FROM assets WHERE asset_type = $1",
        )
        .bind(asset_type)
        .fetch_all(&self.pool)
        .await?;
        if let Some(Json(mapping)) = &mapping {
            names.extend(mapping_property_names(mapping).cloned());
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}
