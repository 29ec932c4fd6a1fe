//! Backend selection.
//!
//! The set of backends is fixed; configuration picks one by name at startup.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::memory::MemoryDocumentStore;
use super::postgres::PgDocumentStore;
use super::{DocumentStore, StoreError, StoreResult};
use crate::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Process-local maps (development and tests).
    Memory,
    /// JSONB tables in Postgres.
    Postgres,
}

impl FromStr for BackendType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(BackendType::Memory),
            "postgres" | "postgresql" => Ok(BackendType::Postgres),
            other => Err(StoreError::UnknownBackend(other.to_string())),
        }
    }
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Memory => "memory",
            BackendType::Postgres => "postgres",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: BackendType,
    /// Connection string for database backends.
    pub database_url: Option<String>,
    /// Apply pending migrations when connecting.
    pub run_migrations: bool,
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self {
            backend: BackendType::Memory,
            database_url: None,
            run_migrations: false,
        }
    }

    pub fn postgres(database_url: impl Into<String>) -> Self {
        Self {
            backend: BackendType::Postgres,
            database_url: Some(database_url.into()),
            run_migrations: true,
        }
    }
}

/// A connected backend. `pool` is set for database backends so other
/// components (event persistence) can share the connections.
#[derive(Clone)]
pub struct OpenedStore {
    pub store: Arc<dyn DocumentStore>,
    pub pool: Option<DbPool>,
}

pub struct StoreFactory;

impl StoreFactory {
    /// Build the configured backend.
    pub async fn create(config: &StoreConfig) -> StoreResult<OpenedStore> {
        match config.backend {
            BackendType::Memory => Ok(OpenedStore {
                store: Self::memory(),
                pool: None,
            }),
            BackendType::Postgres => {
                let url = config.database_url.as_deref().ok_or_else(|| {
                    StoreError::Config("DATABASE_URL is required for the postgres backend".into())
                })?;
                let pool = crate::create_pool(url).await?;
                if config.run_migrations {
                    crate::run_migrations(&pool)
                        .await
                        .map_err(|e| StoreError::Config(format!("Migration failed: {e}")))?;
                }
                tracing::info!(backend = %config.backend, "Document store connected");
                Ok(OpenedStore {
                    store: Arc::new(PgDocumentStore::new(pool.clone())),
                    pool: Some(pool),
                })
            }
        }
    }

    pub fn memory() -> Arc<dyn DocumentStore> {
        Arc::new(MemoryDocumentStore::new()) as Arc<dyn DocumentStore>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn backend_names_are_case_insensitive() {
        assert_eq!("memory".parse::<BackendType>().unwrap(), BackendType::Memory);
        assert_eq!("Postgres".parse::<BackendType>().unwrap(), BackendType::Postgres);
        assert_eq!("postgresql".parse::<BackendType>().unwrap(), BackendType::Postgres);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert_matches!(
            "elasticsearch".parse::<BackendType>(),
            Err(StoreError::UnknownBackend(name)) if name == "elasticsearch"
        );
    }

    #[tokio::test]
    async fn postgres_without_url_fails() {
        let config = StoreConfig {
            backend: BackendType::Postgres,
            database_url: None,
            run_migrations: false,
        };
        assert_matches!(
            StoreFactory::create(&config).await.err(),
            Some(StoreError::Config(_))
        );
    }

    #[tokio::test]
    async fn memory_backend_is_reachable() {
        let opened = StoreFactory::create(&StoreConfig::memory()).await.unwrap();
        assert!(opened.pool.is_none());
        assert_eq!(opened.store.backend_name(), "memory");
        opened.store.ping().await.unwrap();
    }
}
