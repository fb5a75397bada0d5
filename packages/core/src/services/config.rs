//! Catalog Configuration
//!
//! Deployment settings for a catalog, read from the environment:
//!
//! | Variable                  | Values               | Default              |
//! |---------------------------|----------------------|----------------------|
//! | `CATALOG_PERSISTENCE`     | `immediate`, `draft` | `immediate`          |
//! | `CATALOG_DB_PATH`         | file path            | `./data/catalog.db`  |
//! | `CATALOG_CLONE_MODE`      | `shallow`, `deep`    | `shallow`            |
//! | `CATALOG_SAVE_TIMEOUT_MS` | milliseconds (> 0)   | `10000`              |
//!
//! Unknown values are rejected rather than silently replaced by defaults.

use crate::db::{DatabaseError, DatabaseService, TursoCatalogStore};
use crate::operations::CatalogError;
use crate::services::catalog_service::{CatalogService, DEFAULT_SAVE_TIMEOUT};
use crate::services::repository::{
    BatchedRepository, CatalogRepository, ImmediateRepository, PersistenceMode,
};
use crate::tree::CloneMode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const ENV_PERSISTENCE: &str = "CATALOG_PERSISTENCE";
pub const ENV_DB_PATH: &str = "CATALOG_DB_PATH";
pub const ENV_CLONE_MODE: &str = "CATALOG_CLONE_MODE";
pub const ENV_SAVE_TIMEOUT_MS: &str = "CATALOG_SAVE_TIMEOUT_MS";

const DEFAULT_DB_PATH: &str = "./data/catalog.db";

/// Errors raised while reading configuration or opening storage
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Failed to open catalog database: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, expected: &'static str) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_string(),
            expected,
        }
    }
}

/// Settings for one catalog deployment
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    /// Exactly one persistence strategy per catalog
    pub persistence: PersistenceMode,
    pub database_path: PathBuf,
    pub clone_mode: CloneMode,
    /// Bound on each load, row write and snapshot save
    pub save_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            persistence: PersistenceMode::Immediate,
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            clone_mode: CloneMode::Shallow,
            save_timeout: DEFAULT_SAVE_TIMEOUT,
        }
    }
}

impl CatalogConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; missing keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_PERSISTENCE) {
            config.persistence = parse_persistence(&value)?;
        }
        if let Some(value) = lookup(ENV_DB_PATH) {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(ENV_DB_PATH, &value, "a file path"));
            }
            config.database_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_CLONE_MODE) {
            config.clone_mode = parse_clone_mode(&value)?;
        }
        if let Some(value) = lookup(ENV_SAVE_TIMEOUT_MS) {
            config.save_timeout = parse_timeout(&value)?;
        }

        Ok(config)
    }

    /// Open the database and build the repository matching `persistence`
    pub async fn open_repository(&self) -> Result<Arc<dyn CatalogRepository>, ConfigError> {
        let db = Arc::new(DatabaseService::new(self.database_path.clone()).await?);
        let store = Arc::new(TursoCatalogStore::new(db));

        let repository: Arc<dyn CatalogRepository> = match self.persistence {
            PersistenceMode::Immediate => Arc::new(ImmediateRepository::new(store)),
            PersistenceMode::Draft => Arc::new(BatchedRepository::new(store)),
        };
        Ok(repository)
    }

    /// Open the repository and start an editing session on it
    pub async fn open_session(&self) -> Result<CatalogService, ConfigError> {
        let repository = self.open_repository().await?;
        let session = CatalogService::open_with(repository, self.clone_mode, self.save_timeout).await?;
        Ok(session)
    }
}

fn parse_persistence(value: &str) -> Result<PersistenceMode, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "immediate" | "flat" => Ok(PersistenceMode::Immediate),
        "draft" | "batched" => Ok(PersistenceMode::Draft),
        _ => Err(ConfigError::invalid(
            ENV_PERSISTENCE,
            value,
            "'immediate' or 'draft'",
        )),
    }
}

fn parse_clone_mode(value: &str) -> Result<CloneMode, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "shallow" => Ok(CloneMode::Shallow),
        "deep" => Ok(CloneMode::Deep),
        _ => Err(ConfigError::invalid(
            ENV_CLONE_MODE,
            value,
            "'shallow' or 'deep'",
        )),
    }
}

fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(millis) if millis > 0 => Ok(Duration::from_millis(millis)),
        _ => Err(ConfigError::invalid(
            ENV_SAVE_TIMEOUT_MS,
            value,
            "a positive number of milliseconds",
        )),
    }
}
