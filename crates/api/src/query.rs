//! Request input helpers: multi-valued query parameters and optional JSON
//! object bodies.

use axum::body::Bytes;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde_json::Value;
use stockpile_core::query::ParamMap;
use stockpile_core::types::Document;

use crate::error::{AppError, AppResult};

pub const VERSION_PARAM: &str = "version";
pub const IMPORT_PARAM: &str = "import";
pub const DELETE_FIELDS_PARAM: &str = "delete_fields";
pub const DIFF_PARAM: &str = "diff";

/// Every query-string parameter with all of its values, in request order.
///
/// Flags such as `?import` or `?diff` appear with an empty value.
#[derive(Debug, Clone, Default)]
pub struct RequestParams(pub ParamMap);

impl<S: Send + Sync> FromRequestParts<S> for RequestParams {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        let mut params = ParamMap::new();
        for (key, value) in pairs {
            params.entry(key).or_default().push(value);
        }
        Ok(RequestParams(params))
    }
}

impl RequestParams {
    pub fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// `?version=N`, or 0 (live document) when absent.
    pub fn version(&self) -> AppResult<i64> {
        match self.first(VERSION_PARAM) {
            None => Ok(0),
            Some(raw) => raw.trim().parse().map_err(|_| {
                AppError::BadRequest(format!("Invalid version '{raw}'"))
            }),
        }
    }

    /// `?delete_fields=a,b&delete_fields=c` flattened to `[a, b, c]`.
    pub fn delete_fields(&self) -> Vec<String> {
        self.0
            .get(DELETE_FIELDS_PARAM)
            .into_iter()
            .flatten()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Parse an optional JSON object body. An empty body is an empty document.
pub fn parse_body(body: &Bytes) -> AppResult<Document> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(AppError::BadRequest(
            "Request body must be a JSON object".into(),
        )),
        Err(e) => Err(AppError::BadRequest(format!("Invalid JSON body: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        let mut map = ParamMap::new();
        for (k, v) in pairs {
            map.entry(k.to_string()).or_default().push(v.to_string());
        }
        RequestParams(map)
    }

    #[test]
    fn delete_fields_split_and_flatten() {
        let p = params(&[("delete_fields", "a, b"), ("delete_fields", "c,,")]);
        assert_eq!(p.delete_fields(), vec!["a", "b", "c"]);
        assert!(params(&[]).delete_fields().is_empty());
    }

    #[test]
    fn version_defaults_to_live() {
        assert_eq!(params(&[]).version().unwrap(), 0);
        assert_eq!(params(&[("version", "3")]).version().unwrap(), 3);
        assert_matches!(
            params(&[("version", "three")]).version(),
            Err(AppError::BadRequest(_))
        );
    }

    #[test]
    fn flags_are_present_without_values() {
        let p = params(&[("import", "")]);
        assert!(p.has(IMPORT_PARAM));
        assert!(!p.has(DIFF_PARAM));
    }

    #[test]
    fn body_must_be_an_object() {
        assert!(parse_body(&Bytes::from_static(b"  ")).unwrap().is_empty());
        assert_eq!(
            parse_body(&Bytes::from_static(br#"{"os":"linux"}"#)).unwrap()["os"],
            "linux"
        );
        assert_matches!(
            parse_body(&Bytes::from_static(b"[1,2]")),
            Err(AppError::BadRequest(_))
        );
        assert_matches!(
            parse_body(&Bytes::from_static(b"{oops")),
            Err(AppError::BadRequest(_))
        );
    }
}
