//! Catalog Repository
//!
//! One interface over the two persistence strategies. A deployment picks a
//! single [`PersistenceMode`] per catalog and the editing session never knows
//! which one it is talking to:
//!
//! - [`ImmediateRepository`] (flat mode): each mutation's rows are written to
//!   `catalog_nodes` as it happens; `save_catalog` has nothing left to do
//! - [`BatchedRepository`] (draft mode): mutations stay in memory; `save_catalog`
//!   writes the whole nested document to `catalog_snapshots` in one
//!   compare-and-swap

use crate::db::{CatalogStore, DatabaseError, SnapshotWrite};
use crate::models::CatalogNode;
use crate::operations::{CatalogError, ChangeSet, PersistenceOperation};
use crate::tree::{materialize, repaired_rows, rows_from_nested, Catalog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Snapshot key used when a deployment holds a single catalog
pub const DEFAULT_SNAPSHOT_ID: &str = "catalog";

/// How catalog edits reach storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Every structural operation is written immediately, one commit each
    #[default]
    Immediate,
    /// Edits are staged and saved as one atomic snapshot on request
    Draft,
}

impl fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("immediate"),
            Self::Draft => f.write_str("draft"),
        }
    }
}

/// A catalog as loaded from storage
#[derive(Debug, Clone)]
pub struct LoadedCatalog {
    pub catalog: Catalog,
    /// Snapshot version the session starts from (always 0 in flat mode)
    pub version: u64,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Nested JSON document stored in `catalog_snapshots.document`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    pub version: u64,
    pub saved_at: DateTime<Utc>,
    pub roots: Vec<CatalogNode>,
}

/// Persistence strategy behind a catalog editing session
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    fn mode(&self) -> PersistenceMode;

    /// Load the catalog and the version it was stored at
    async fn load_catalog(&self) -> Result<LoadedCatalog, CatalogError>;

    /// Persist (or stage) the row changes of one mutation
    async fn record_changes(&self, changes: &ChangeSet) -> Result<(), CatalogError>;

    /// Persist the whole catalog, returning the new version
    ///
    /// # Errors
    ///
    /// `VersionConflict` when the stored version is no longer `expected_version`.
    async fn save_catalog(
        &self,
        catalog: &Catalog,
        expected_version: u64,
    ) -> Result<u64, CatalogError>;
}

/// Translate a store error into a `PersistenceFailure`, keeping the row a
/// `RowWriteFailed` names
fn persistence_failure(
    err: anyhow::Error,
    operation: PersistenceOperation,
    node_id: Option<&str>,
) -> CatalogError {
    match err.downcast_ref::<DatabaseError>() {
        Some(DatabaseError::RowWriteFailed {
            operation,
            node_id,
            reason,
        }) => CatalogError::persistence_failure(*operation, Some(node_id), reason.clone()),
        _ => CatalogError::persistence_failure(operation, node_id, format!("{:#}", err)),
    }
}

/// Flat-mode repository: one parent-pointer row per node, written per operation
pub struct ImmediateRepository {
    store: Arc<dyn CatalogStore>,
}

impl ImmediateRepository {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CatalogRepository for ImmediateRepository {
    fn mode(&self) -> PersistenceMode {
        PersistenceMode::Immediate
    }

    async fn load_catalog(&self) -> Result<LoadedCatalog, CatalogError> {
        let rows = self
            .store
            .load_rows()
            .await
            .map_err(|e| persistence_failure(e, PersistenceOperation::LoadCatalog, None))?;
        let row_count = rows.len();
        let catalog = materialize(rows.clone())?;

        let repairs = repaired_rows(&rows, &catalog);
        if !repairs.is_empty() {
            tracing::warn!(
                "Writing back {} repaired catalog row(s) after load",
                repairs.len()
            );
            self.store
                .apply_changes(&repairs)
                .await
                .map_err(|e| persistence_failure(e, PersistenceOperation::LoadCatalog, None))?;
        }

        tracing::info!(
            "Loaded catalog with {} node(s) in {} tree(s) from flat rows",
            row_count,
            catalog.roots().len()
        );
        Ok(LoadedCatalog {
            catalog,
            version: 0,
            saved_at: None,
        })
    }

    async fn record_changes(&self, changes: &ChangeSet) -> Result<(), CatalogError> {
        let Some(first) = changes.iter().next() else {
            return Ok(());
        };

        self.store.apply_changes(changes).await.map_err(|e| {
            let err = persistence_failure(e, first.operation(), None);
            tracing::warn!("Catalog row write failed: {}", err);
            err
        })?;

        tracing::debug!("Wrote {} catalog row change(s)", changes.len());
        Ok(())
    }

    async fn save_catalog(
        &self,
        _catalog: &Catalog,
        expected_version: u64,
    ) -> Result<u64, CatalogError> {
        Ok(expected_version)
    }
}

/// Draft-mode repository: the catalog is saved as one versioned JSON snapshot
pub struct BatchedRepository {
    store: Arc<dyn CatalogStore>,
    snapshot_id: String,
}

impl BatchedRepository {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self::with_snapshot_id(store, DEFAULT_SNAPSHOT_ID)
    }

    pub fn with_snapshot_id(store: Arc<dyn CatalogStore>, snapshot_id: impl Into<String>) -> Self {
        Self {
            store,
            snapshot_id: snapshot_id.into(),
        }
    }
}

#[async_trait]
impl CatalogRepository for BatchedRepository {
    fn mode(&self) -> PersistenceMode {
        PersistenceMode::Draft
    }

    async fn load_catalog(&self) -> Result<LoadedCatalog, CatalogError> {
        let stored = self
            .store
            .load_snapshot(&self.snapshot_id)
            .await
            .map_err(|e| persistence_failure(e, PersistenceOperation::LoadCatalog, None))?;

        let Some(stored) = stored else {
            tracing::info!(
                "No snapshot '{}' stored yet; starting with an empty catalog",
                self.snapshot_id
            );
            return Ok(LoadedCatalog {
                catalog: Catalog::new(),
                version: 0,
                saved_at: None,
            });
        };

        let document: CatalogDocument = serde_json::from_str(&stored.document).map_err(|e| {
            CatalogError::corrupt_catalog(format!(
                "snapshot '{}' is not a catalog document: {}",
                self.snapshot_id, e
            ))
        })?;
        if document.version != stored.version {
            tracing::warn!(
                "Snapshot '{}' document says version {} but row says {}; using the row",
                self.snapshot_id,
                document.version,
                stored.version
            );
        }

        // Parent ids and levels are re-derived from nesting, never trusted
        let catalog = materialize(rows_from_nested(document.roots))?;

        tracing::info!(
            "Loaded catalog snapshot '{}' at version {} ({} node(s))",
            self.snapshot_id,
            stored.version,
            catalog.len()
        );
        Ok(LoadedCatalog {
            catalog,
            version: stored.version,
            saved_at: Some(stored.saved_at),
        })
    }

    async fn record_changes(&self, _changes: &ChangeSet) -> Result<(), CatalogError> {
        Ok(())
    }

    async fn save_catalog(
        &self,
        catalog: &Catalog,
        expected_version: u64,
    ) -> Result<u64, CatalogError> {
        let document = CatalogDocument {
            version: expected_version + 1,
            saved_at: Utc::now(),
            roots: catalog.roots().to_vec(),
        };
        let json = serde_json::to_string(&document)?;

        let outcome = self
            .store
            .save_snapshot(&self.snapshot_id, expected_version, &json)
            .await
            .map_err(|e| persistence_failure(e, PersistenceOperation::SaveCatalog, None))?;

        match outcome {
            SnapshotWrite::Saved { version } => {
                tracing::info!(
                    "Saved catalog snapshot '{}' at version {}",
                    self.snapshot_id,
                    version
                );
                Ok(version)
            }
            SnapshotWrite::Conflict { actual_version } => {
                tracing::warn!(
                    "Snapshot '{}' moved to version {} since version {} was loaded",
                    self.snapshot_id,
                    actual_version,
                    expected_version
                );
                Err(CatalogError::version_conflict(
                    expected_version,
                    actual_version,
                ))
            }
        }
    }
}
