//! Per-type field rules: required keys and enumerated values.
//!
//! The schema is loaded from configuration at startup and never changes at
//! runtime. Required-ness and enforcement are independent checks: an
//! enforced field may be absent, and a required field may hold any value.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::types::Document;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTypeSchema {
    /// Keys that must be present in every asset's data.
    #[serde(default)]
    pub required_fields: BTreeSet<String>,

    /// Keys whose value, when present, must be one of the listed strings.
    #[serde(default)]
    pub enforced_fields: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("'{0}' field required")]
    MissingRequiredField(String),

    #[error("'{field}' field must be one of: {}", join_allowed(.allowed))]
    InvalidFieldValue {
        field: String,
        allowed: BTreeSet<String>,
    },
}

fn join_allowed(allowed: &BTreeSet<String>) -> String {
    allowed.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl From<FieldError> for CoreError {
    fn from(err: FieldError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

impl AssetTypeSchema {
    pub fn is_required_field(&self, field: &str) -> bool {
        self.required_fields.contains(field)
    }

    /// Every required field must be a key of `doc`. Only presence is checked.
    pub fn validate_required(&self, doc: &Document) -> Result<(), FieldError> {
        match self.required_fields.iter().find(|f| !doc.contains_key(*f)) {
            Some(missing) => Err(FieldError::MissingRequiredField(missing.clone())),
            None => Ok(()),
        }
    }

    /// Every enforced field present in `doc` must equal an allowed value.
    ///
    /// Comparison is strict equality against a JSON string; a number or bool
    /// never matches even if its text form would.
    pub fn validate_enforced(&self, doc: &Document) -> Result<(), FieldError> {
        for (field, allowed) in &self.enforced_fields {
            let Some(value) = doc.get(field) else {
                continue;
            };
            let matches = match value {
                Value::String(s) => allowed.contains(s),
                _ => false,
            };
            if !matches {
                return Err(FieldError::InvalidFieldValue {
                    field: field.clone(),
                    allowed: allowed.clone(),
                });
            }
        }
        Ok(())
    }

    /// Reject deletion of any required field.
    pub fn check_deletable(&self, fields: &[String]) -> Result<(), CoreError> {
        match fields.iter().find(|f| self.is_required_field(f)) {
            Some(field) => Err(CoreError::ProtectedField(format!(
                "Cannot delete required field '{field}'"
            ))),
            None => Ok(()),
        }
    }
}
