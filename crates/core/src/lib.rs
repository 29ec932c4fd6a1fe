//! Stockpile domain core.
//!
//! Pure logic shared by the repository, event, and API crates: the asset
//! model, field validation, query translation, version coercion, and
//! snapshot diffing. Nothing here talks to a store.

pub mod asset;
pub mod diff;
pub mod error;
pub mod event;
pub mod query;
pub mod schema;
pub mod types;
pub mod version;
