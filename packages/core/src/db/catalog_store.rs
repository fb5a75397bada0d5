//! CatalogStore Trait - Catalog Persistence Abstraction
//!
//! This module defines the `CatalogStore` trait that abstracts how catalog data
//! reaches disk. Repositories in the service layer build on it; the libsql
//! implementation is [`TursoCatalogStore`](crate::db::TursoCatalogStore).
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so embedded and networked
//!    backends share one contract
//! 2. **Error Handling**: Uses `anyhow::Result`; row write failures carry a
//!    [`DatabaseError::RowWriteFailed`](crate::db::DatabaseError) that callers
//!    can downcast to find the failing row
//! 3. **Two shapes**: flat parent-pointer rows for immediate writes, and a
//!    versioned JSON snapshot for atomic draft saves
//!
//! # Examples
//!
//! ```rust,no_run
//! use carecatalog_core::db::{CatalogStore, DatabaseService, TursoCatalogStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/catalog.db")).await?);
//!     let store: Arc<dyn CatalogStore> = Arc::new(TursoCatalogStore::new(db));
//!
//!     let rows = store.load_rows().await?;
//!     println!("{} catalog rows", rows.len());
//!     Ok(())
//! }
//! ```

use crate::models::CatalogRow;
use crate::operations::ChangeSet;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A stored catalog snapshot as read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub version: u64,
    /// Serialized `CatalogDocument` JSON
    pub document: String,
    pub saved_at: DateTime<Utc>,
}

/// Outcome of a compare-and-swap snapshot write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotWrite {
    /// Written; the snapshot now carries `version`
    Saved { version: u64 },
    /// Rejected; someone else saved `actual_version` in the meantime
    Conflict { actual_version: u64 },
}

/// Persistence operations for one catalog
///
/// Implementations must be `Send + Sync`; the editing session holds the store
/// behind an `Arc` and awaits it from tokio tasks.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    //
    // FLAT ROWS
    //

    /// Load every catalog row, in no particular order
    async fn load_rows(&self) -> Result<Vec<CatalogRow>>;

    /// Insert one row (autocommit)
    async fn insert_row(&self, row: &CatalogRow) -> Result<()>;

    /// Overwrite one existing row (autocommit)
    ///
    /// # Errors
    ///
    /// Fails if no row with `row.id` exists.
    async fn update_row(&self, row: &CatalogRow) -> Result<()>;

    /// Delete one row; returns whether it existed
    async fn delete_row(&self, id: &str) -> Result<bool>;

    /// Apply the rows of one mutation in a single transaction
    ///
    /// On failure the transaction is rolled back and the error identifies the
    /// row that failed.
    async fn apply_changes(&self, changes: &ChangeSet) -> Result<()>;

    //
    // SNAPSHOTS
    //

    /// Read the snapshot stored under `snapshot_id`, if any
    async fn load_snapshot(&self, snapshot_id: &str) -> Result<Option<StoredSnapshot>>;

    /// Replace the snapshot if its stored version still equals `expected_version`
    ///
    /// A missing snapshot counts as version 0.
    async fn save_snapshot(
        &self,
        snapshot_id: &str,
        expected_version: u64,
        document: &str,
    ) -> Result<SnapshotWrite>;

    //
    // LIFECYCLE
    //

    /// Flush pending writes before shutdown
    async fn close(&self) -> Result<()>;
}
