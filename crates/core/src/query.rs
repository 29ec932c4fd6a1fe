//! Translation of flat request parameters into structured store queries.
//!
//! Filters arrive as a map of field name to value (query-string values are
//! joined with `|` before they get here). Each string value is classified as
//! a numeric range, a regex, or an exact term. Pagination, sort, and
//! aggregation come from a separate multi-valued parameter map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::types::Document;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Request field that addresses an asset's id.
pub const ID_PARAM: &str = "id";

/// Store field holding the primary key of a document.
pub const PRIMARY_KEY_FIELD: &str = "_id";

/// Store dimension holding a document's asset type.
pub const TYPE_FIELD: &str = "_type";

pub const SORT_PARAM: &str = "sort";
pub const FROM_PARAM: &str = "from";
pub const SIZE_PARAM: &str = "size";
pub const AGGREGATE_PARAM: &str = "aggregate";

/// Parameter names that control the result window rather than filter.
pub const RESERVED_PARAMS: &[&str] = &[SORT_PARAM, FROM_PARAM, SIZE_PARAM, AGGREGATE_PARAM];

/// Characters that turn a filter value into a regex search.
const REGEX_TRIGGER_CHARS: &[char] = &['*', '+', '^', '$', '|'];

/// Separator used when a query-string field is given more than once.
pub const MULTI_VALUE_SEPARATOR: &str = "|";

/// Multi-valued request parameters, as parsed from a query string.
pub type ParamMap = BTreeMap<String, Vec<String>>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Malformed range value for '{field}': '{value}'")]
    MalformedRangeValue { field: String, value: String },

    #[error("Sort must be in `key:[asc desc]` format, got '{0}'")]
    InvalidSortDirection(String),

    #[error("'{param}' must be a non-negative integer, got '{value}'")]
    InvalidNumber { param: &'static str, value: String },
}

impl From<QueryError> for CoreError {
    fn from(err: QueryError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeOp {
    Gt,
    Lt,
}

/// Numeric bound of a range predicate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeValue {
    Int(i64),
    Float(f64),
}

impl RangeValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            RangeValue::Int(i) => i as f64,
            RangeValue::Float(f) => f,
        }
    }
}

/// A single field-level filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterPredicate {
    Term {
        field: String,
        value: String,
    },
    Range {
        field: String,
        op: RangeOp,
        value: RangeValue,
    },
    Regex {
        field: String,
        pattern: String,
    },
}

impl FilterPredicate {
    pub fn field(&self) -> &str {
        match self {
            FilterPredicate::Term { field, .. }
            | FilterPredicate::Range { field, .. }
            | FilterPredicate::Regex { field, .. } => field,
        }
    }
}

/// Classify one string filter value.
///
/// A leading `>` or `<` makes a range (a following `=` is accepted and
/// ignored, so `>=5` and `>5` are the same strict bound). Otherwise any regex
/// trigger character makes a regex, and anything else is an exact term.
pub fn classify_filter(field: &str, raw: &str) -> Result<FilterPredicate, QueryError> {
    let value = raw.trim();

    let op = if value.starts_with('>') {
        Some(RangeOp::Gt)
    } else if value.starts_with('<') {
        Some(RangeOp::Lt)
    } else {
        None
    };

    if let Some(op) = op {
        let bound = value[1..].strip_prefix('=').unwrap_or(&value[1..]).trim();
        let number = parse_range_number(bound).ok_or_else(|| QueryError::MalformedRangeValue {
            field: field.to_string(),
            value: raw.to_string(),
        })?;
        return Ok(FilterPredicate::Range {
            field: field.to_string(),
            op,
            value: number,
        });
    }

    if value.contains(REGEX_TRIGGER_CHARS) {
        return Ok(FilterPredicate::Regex {
            field: field.to_string(),
            pattern: value.to_string(),
        });
    }

    Ok(FilterPredicate::Term {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Parse a range bound as an integer, falling back to a finite float.
fn parse_range_number(s: &str) -> Option<RangeValue> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(RangeValue::Int(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(RangeValue::Float)
}

/// Whole-value form of a regex filter pattern.
///
/// Patterns match the entire field value. A `*` with nothing to repeat (at
/// the start, or after `(` or `|`) is read as `.*`, so `*-prod` matches any
/// value ending in `-prod`. A `*` closing an alternative right after a plain
/// character is read the same way, so `*prod*` matches `web-prod-01`.
pub fn anchored_pattern(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut body = String::with_capacity(pattern.len() + 8);
    for (i, &c) in chars.iter().enumerate() {
        if c == '*' {
            let prev = i.checked_sub(1).map(|j| chars[j]);
            let next = chars.get(i + 1).copied();
            let leading = matches!(prev, None | Some('(') | Some('|'));
            let trailing = matches!(next, None | Some(')') | Some('|'))
                && prev.is_some_and(is_plain_char)
                && !escaped(&chars, i - 1);
            if leading || trailing {
                body.push('.');
            }
        }
        body.push(c);
    }
    format!("^(?:{body})$")
}

fn is_plain_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '/' | '@')
}

// Odd run of backslashes before `idx` means the char at `idx` is escaped.
fn escaped(chars: &[char], idx: usize) -> bool {
    chars[..idx].iter().rev().take_while(|&&c| c == '\\').count() % 2 == 1
}

/// Turn a filter map into a conjunction of predicates.
///
/// `id` is rewritten to the store's primary-key field. Values that are not
/// strings (numbers, bools, arrays, objects from a JSON body) do not produce
/// a predicate.
pub fn translate_filters(filters: &Document) -> Result<Vec<FilterPredicate>, QueryError> {
    let mut predicates = Vec::with_capacity(filters.len());
    for (key, value) in filters {
        let Value::String(raw) = value else {
            continue;
        };
        let field = if key == ID_PARAM {
            PRIMARY_KEY_FIELD
        } else {
            key.as_str()
        };
        predicates.push(classify_filter(field, raw)?);
    }
    Ok(predicates)
}

// ---------------------------------------------------------------------------
// Request parameter handling
// ---------------------------------------------------------------------------

/// Extract filter fields from query-string parameters.
///
/// Reserved parameters are skipped; repeated values are joined with `|`,
/// which makes them an alternation regex.
pub fn filter_params(params: &ParamMap) -> Document {
    params
        .iter()
        .filter(|(k, _)| !RESERVED_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), Value::String(v.join(MULTI_VALUE_SEPARATOR))))
        .collect()
}

/// Overlay a JSON request body onto query-string filters. Body keys win.
pub fn merge_body(filters: &mut Document, body: Document) {
    for (k, v) in body {
        filters.insert(k, v);
    }
}

// ---------------------------------------------------------------------------
// Sort / pagination / aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub order: SortOrder,
}

impl SortField {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

/// Parse `field` / `field:asc` / `field:desc` sort entries.
pub fn parse_sort(values: &[String]) -> Result<Vec<SortField>, QueryError> {
    values
        .iter()
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').collect();
            match parts.as_slice() {
                [field] => Ok(SortField::new(*field, SortOrder::Asc)),
                [field, "asc"] => Ok(SortField::new(*field, SortOrder::Asc)),
                [field, "desc"] => Ok(SortField::new(*field, SortOrder::Desc)),
                _ => Err(QueryError::InvalidSortDirection(entry.clone())),
            }
        })
        .collect()
}

/// Pagination, sort, and aggregation directives of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub from: i64,
    pub size: i64,
    pub sort: Vec<SortField>,
    pub aggregate: Option<String>,
}

impl QueryOptions {
    /// Read the reserved parameters. A missing `from` defaults to 0 and a
    /// missing `size` to `default_size`.
    pub fn from_params(default_size: i64, params: &ParamMap) -> Result<Self, QueryError> {
        let from = first(params, FROM_PARAM)
            .map(|v| parse_non_negative(FROM_PARAM, v))
            .transpose()?
            .unwrap_or(0);
        let size = first(params, SIZE_PARAM)
            .map(|v| parse_non_negative(SIZE_PARAM, v))
            .transpose()?
            .unwrap_or(default_size);
        let sort = params
            .get(SORT_PARAM)
            .map(|v| parse_sort(v))
            .transpose()?
            .unwrap_or_default();
        let aggregate = first(params, AGGREGATE_PARAM)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            from,
            size,
            sort,
            aggregate,
        })
    }
}

fn first<'a>(params: &'a ParamMap, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.first())
        .map(String::as_str)
}

fn parse_non_negative(param: &'static str, value: &str) -> Result<i64, QueryError> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| QueryError::InvalidNumber {
            param,
            value: value.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Structured query
// ---------------------------------------------------------------------------

/// Which slice of the matching documents a query returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResultWindow {
    /// Document hits `[from, from + size)`.
    Page { from: i64, size: i64 },
    /// No document hits; up to `buckets` value counts of `field`.
    Aggregate { field: String, buckets: i64 },
}

/// A conjunctive filter plus its result window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub predicates: Vec<FilterPredicate>,
    pub sort: Vec<SortField>,
    pub window: ResultWindow,
}

impl StructuredQuery {
    pub fn is_match_all(&self) -> bool {
        self.predicates.is_empty()
    }

    /// The aggregated field, when this is an aggregation query.
    pub fn aggregate_field(&self) -> Option<&str> {
        match &self.window {
            ResultWindow::Aggregate { field, .. } => Some(field),
            ResultWindow::Page { .. } => None,
        }
    }

    pub fn from_options(predicates: Vec<FilterPredicate>, options: QueryOptions) -> Self {
        let window = match options.aggregate {
            Some(field) => ResultWindow::Aggregate {
                field,
                buckets: options.size,
            },
            None => ResultWindow::Page {
                from: options.from,
                size: options.size,
            },
        };
        Self {
            predicates,
            sort: options.sort,
            window,
        }
    }
}

/// Build a structured query from a filter map and the reserved parameters.
pub fn build_query(
    filters: &Document,
    params: &ParamMap,
    default_size: i64,
) -> Result<StructuredQuery, QueryError> {
    let predicates = translate_filters(filters)?;
    let options = QueryOptions::from_params(default_size, params)?;
    Ok(StructuredQuery::from_options(predicates, options))
}
