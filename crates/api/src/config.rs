use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use stockpile_core::event::DEFAULT_QUEUE_CAPACITY;
use stockpile_core::schema::AssetTypeSchema;
use stockpile_db::store::{BackendType, StoreConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("DATABASE_URL must be set for the {0} datastore")]
    MissingDatabaseUrl(BackendType),

    #[error("Failed to read asset config {path}: {source}")]
    AssetConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid asset config {path}: {source}")]
    AssetConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development with the
/// in-memory datastore.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Page size when a query gives no `size` (default: `100`).
    pub default_result_size: i64,
    pub datastore: BackendType,
    pub database_url: Option<String>,
    /// JSON file holding the asset field rules.
    pub asset_config_path: Option<PathBuf>,
    /// Users allowed to create asset types.
    pub admin_users: BTreeSet<String>,
    pub event_queue_capacity: usize,
    /// Mount point of the asset API (default: `/api/v1`).
    pub api_prefix: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `DEFAULT_RESULT_SIZE`  | `100`                      |
    /// | `DATASTORE`            | `memory`                   |
    /// | `DATABASE_URL`         | (required for `postgres`)  |
    /// | `ASSET_CONFIG_PATH`    | (no field rules)           |
    /// | `ADMIN_USERS`          | (none)                     |
    /// | `EVENT_QUEUE_CAPACITY` | `64`                       |
    /// | `API_PREFIX`           | `/api/v1`                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let datastore = match var("DATASTORE") {
            Some(raw) => raw.parse::<BackendType>().map_err(|_| ConfigError::InvalidValue {
                name: "DATASTORE",
                value: raw,
            })?,
            None => BackendType::Memory,
        };

        let database_url = var("DATABASE_URL");
        if datastore == BackendType::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl(datastore));
        }

        let default_result_size: i64 = parse_var(&var, "DEFAULT_RESULT_SIZE", 100)?;
        if default_result_size <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "DEFAULT_RESULT_SIZE",
                value: default_result_size.to_string(),
            });
        }

        let api_prefix = var("API_PREFIX").unwrap_or_else(|| "/api/v1".into());
        let api_prefix = format!("/{}", api_prefix.trim().trim_matches('/'));

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_var(&var, "PORT", 3000)?,
            cors_origins: split_list(
                &var("CORS_ORIGINS").unwrap_or_else(|| "http://localhost:5173".into()),
            ),
            request_timeout_secs: parse_var(&var, "REQUEST_TIMEOUT_SECS", 30)?,
            default_result_size,
            datastore,
            database_url,
            asset_config_path: var("ASSET_CONFIG_PATH").map(PathBuf::from),
            admin_users: split_list(&var("ADMIN_USERS").unwrap_or_default())
                .into_iter()
                .collect(),
            event_queue_capacity: parse_var(&var, "EVENT_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            api_prefix,
        })
    }

    pub fn is_admin(&self, user: &str) -> bool {
        self.admin_users.contains(user)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            backend: self.datastore,
            database_url: self.database_url.clone(),
            run_migrations: self.datastore == BackendType::Postgres,
        }
    }

    /// Read the asset field rules. Without `ASSET_CONFIG_PATH` no field is
    /// required or enforced.
    pub fn load_asset_schema(&self) -> Result<AssetTypeSchema, ConfigError> {
        let Some(path) = &self.asset_config_path else {
            return Ok(AssetTypeSchema::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::AssetConfigRead {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::AssetConfigParse {
            path: path.clone(),
            source,
        })
    }
}

fn parse_var<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
