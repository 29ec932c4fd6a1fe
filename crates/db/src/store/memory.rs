//! In-memory document store.
//!
//! Backed by ordered maps behind a single `RwLock`. Query semantics follow
//! the Postgres backend: regexes match whole values, ranges only match
//! numbers, and array fields match when any element does.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use stockpile_core::asset::{AggregatedItem, Asset};
use stockpile_core::query::{
    anchored_pattern, FilterPredicate, RangeOp, ResultWindow, SortField, SortOrder,
    StructuredQuery, PRIMARY_KEY_FIELD, TYPE_FIELD,
};
use stockpile_core::types::{now_millis, Document};
use tokio::sync::RwLock;

use super::{
    bucket_name, mapping_property_names, DocumentStore, SearchResult, StoreError, StoreResult,
};

#[derive(Debug, Clone)]
struct StoredDoc {
    data: Document,
    timestamp: i64,
}

impl StoredDoc {
    fn new(data: Document, timestamp: i64) -> Self {
        Self { data, timestamp }
    }

    fn to_asset(&self, asset_type: &str, id: &str) -> Asset {
        let mut asset = Asset::new(asset_type, id, self.data.clone());
        asset.timestamp = Some(Value::from(self.timestamp));
        asset
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    /// `(type, id)` -> live document.
    live: BTreeMap<(String, String), StoredDoc>,
    /// `(type, id, version)` -> snapshot.
    history: BTreeMap<(String, String, i64), StoredDoc>,
    /// type -> mapping.
    types: BTreeMap<String, Document>,
}

/// Process-local [`DocumentStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Predicate evaluation
// ---------------------------------------------------------------------------

enum CompiledPredicate<'q> {
    Term { field: &'q str, value: &'q str },
    Range { field: &'q str, op: RangeOp, bound: f64 },
    Regex { field: &'q str, re: Regex },
}

fn compile(predicates: &[FilterPredicate]) -> StoreResult<Vec<CompiledPredicate<'_>>> {
    predicates
        .iter()
        .map(|p| match p {
            FilterPredicate::Term { field, value } => Ok(CompiledPredicate::Term { field, value }),
            FilterPredicate::Range { field, op, value } => Ok(CompiledPredicate::Range {
                field,
                op: *op,
                bound: value.as_f64(),
            }),
            FilterPredicate::Regex { field, pattern } => Regex::new(&anchored_pattern(pattern))
                .map(|re| CompiledPredicate::Regex { field, re })
                .map_err(|e| StoreError::InvalidQuery(format!("Invalid regex '{pattern}': {e}"))),
        })
        .collect()
}

/// Value of a field, including the `_id` and `_type` dimensions.
fn field_value(asset_type: &str, id: &str, data: &Document, field: &str) -> Option<Value> {
    match field {
        PRIMARY_KEY_FIELD => Some(Value::String(id.to_string())),
        TYPE_FIELD => Some(Value::String(asset_type.to_string())),
        _ => data.get(field).cloned(),
    }
}

/// Apply `test` to a scalar, or to each element of an array.
fn any_scalar(value: &Value, test: &dyn Fn(&Value) -> bool) -> bool {
    match value {
        Value::Array(items) => items.iter().any(test),
        scalar => test(scalar),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn matches(pred: &CompiledPredicate<'_>, asset_type: &str, id: &str, data: &Document) -> bool {
    let field = match pred {
        CompiledPredicate::Term { field, .. }
        | CompiledPredicate::Range { field, .. }
        | CompiledPredicate::Regex { field, .. } => *field,
    };
    let Some(value) = field_value(asset_type, id, data, field) else {
        return false;
    };

    match pred {
        CompiledPredicate::Term { value: wanted, .. } => any_scalar(&value, &|v: &Value| {
            scalar_text(v).is_some_and(|text| text == *wanted)
        }),
        CompiledPredicate::Range { op, bound, .. } => any_scalar(&value, &|v: &Value| {
            v.as_f64().is_some_and(|n| match op {
                RangeOp::Gt => n > *bound,
                RangeOp::Lt => n < *bound,
            })
        }),
        CompiledPredicate::Regex { re, .. } => any_scalar(&value, &|v: &Value| {
            scalar_text(v).is_some_and(|text| re.is_match(&text))
        }),
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

/// Documents missing a sort field go last in either direction.
fn compare_by_sort(
    sort: &[SortField],
    a: &(&(String, String), &StoredDoc),
    b: &(&(String, String), &StoredDoc),
) -> Ordering {
    for key in sort {
        let va = field_value(&a.0 .0, &a.0 .1, &a.1.data, &key.field);
        let vb = field_value(&b.0 .0, &b.0 .1, &b.1.data, &key.field);
        let ord = match (va, vb) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => match key.order {
                SortOrder::Asc => compare_values(&x, &y),
                SortOrder::Desc => compare_values(&y, &x),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn to_usize(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// DocumentStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get(&self, asset_type: &str, id: &str) -> StoreResult<Option<Asset>> {
        let state = self.state.read().await;
        Ok(state
            .live
            .get(&(asset_type.to_string(), id.to_string()))
            .map(|doc| doc.to_asset(asset_type, id)))
    }

    async fn index(&self, asset: &Asset) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .types
            .entry(asset.asset_type.clone())
            .or_insert_with(Document::new);
        state.live.insert(
            (asset.asset_type.clone(), asset.id.clone()),
            StoredDoc::new(asset.data.clone(), now_millis()),
        );
        Ok(())
    }

    async fn merge(&self, asset: &Asset) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let doc = state
            .live
            .get_mut(&(asset.asset_type.clone(), asset.id.clone()))
            .ok_or_else(|| StoreError::NotFound(asset.subject()))?;
        for (k, v) in &asset.data {
            doc.data.insert(k.clone(), v.clone());
        }
        doc.timestamp = now_millis();
        Ok(())
    }

    async fn delete(&self, asset_type: &str, id: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .live
            .remove(&(asset_type.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("{asset_type}.{id}")))
    }

    async fn search(
        &self,
        asset_type: Option<&str>,
        query: &StructuredQuery,
    ) -> StoreResult<SearchResult> {
        let predicates = compile(&query.predicates)?;
        let state = self.state.read().await;

        let mut hits: Vec<(&(String, String), &StoredDoc)> = state
            .live
            .iter()
            .filter(|((t, _), _)| asset_type.map_or(true, |wanted| t == wanted))
            .filter(|((t, id), doc)| predicates.iter().all(|p| matches(p, t, id, &doc.data)))
            .collect();

        match &query.window {
            ResultWindow::Aggregate { field, buckets } => {
                let mut counts: HashMap<String, i64> = HashMap::new();
                for ((t, id), doc) in &hits {
                    let Some(value) = field_value(t, id, &doc.data, field) else {
                        continue;
                    };
                    let names: Vec<String> = match &value {
                        Value::Array(items) => items.iter().map(bucket_name).collect(),
                        Value::Null => Vec::new(),
                        other => vec![bucket_name(other)],
                    };
                    for name in names {
                        *counts.entry(name).or_insert(0) += 1;
                    }
                }
                let mut items: Vec<AggregatedItem> = counts
                    .into_iter()
                    .map(|(name, count)| AggregatedItem { name, count })
                    .collect();
                items.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
                items.truncate(to_usize(*buckets));
                Ok(SearchResult::Buckets(items))
            }
            ResultWindow::Page { from, size } => {
                if !query.sort.is_empty() {
                    hits.sort_by(|a, b| compare_by_sort(&query.sort, a, b));
                }
                let assets = hits
                    .into_iter()
                    .skip(to_usize(*from))
                    .take(to_usize(*size))
                    .map(|((t, id), doc)| doc.to_asset(t, id))
                    .collect();
                Ok(SearchResult::Hits(assets))
            }
        }
    }

    async fn put_version(&self, snapshot: &Asset, version: i64) -> StoreResult<bool> {
        let mut data = snapshot.data.clone();
        data.insert(
            stockpile_core::version::VERSION_FIELD.into(),
            Value::from(version),
        );
        let timestamp = snapshot
            .timestamp
            .as_ref()
            .and_then(Value::as_i64)
            .unwrap_or_else(now_millis);

        let mut state = self.state.write().await;
        match state
            .history
            .entry((snapshot.asset_type.clone(), snapshot.id.clone(), version))
        {
            Entry::Vacant(slot) => {
                slot.insert(StoredDoc::new(data, timestamp));
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
        }
    }

    async fn get_version(
        &self,
        asset_type: &str,
        id: &str,
        version: i64,
    ) -> StoreResult<Option<Asset>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .get(&(asset_type.to_string(), id.to_string(), version))
            .map(|doc| doc.to_asset(asset_type, id)))
    }

    async fn list_versions(
        &self,
        asset_type: &str,
        id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Asset>> {
        let state = self.state.read().await;
        let lower = (asset_type.to_string(), id.to_string(), i64::MIN);
        let upper = (asset_type.to_string(), id.to_string(), i64::MAX);
        Ok(state
            .history
            .range(lower..=upper)
            .rev()
            .take(to_usize(limit))
            .map(|(_, doc)| doc.to_asset(asset_type, id))
            .collect())
    }

    async fn register_type(&self, asset_type: &str, mapping: &Document) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.types.insert(asset_type.to_string(), mapping.clone());
        Ok(())
    }

    async fn registered_types(&self) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state.types.keys().cloned().collect())
    }

    async fn type_properties(&self, asset_type: &str) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        let mapping = state.types.get(asset_type);

        let mut names: BTreeSet<String> = mapping
            .map(|m| mapping_property_names(m).cloned().collect())
            .unwrap_or_default();
        let mut populated = false;
        for ((t, _), doc) in &state.live {
            if t == asset_type {
                populated = true;
                names.extend(doc.data.keys().cloned());
            }
        }

        if mapping.is_none() && !populated {
            return Err(StoreError::NotFound(asset_type.to_string()));
        }
        Ok(names.into_iter().collect())
    }
}
