//! Repository layer.
//!
//! [`AssetRepo`] is an instance holding its document store; [`EventRepo`] is
//! a zero-sized struct whose methods take `&PgPool` as the first argument.

pub mod asset_repo;
pub mod event_repo;

pub use asset_repo::{AssetRepo, CreateOptions, QueryResult};
pub use event_repo::EventRepo;
