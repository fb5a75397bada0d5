//! Database Layer
//!
//! This module handles all catalog persistence using libsql/Turso:
//!
//! - Database initialization and connection management (`DatabaseService`)
//! - The `CatalogStore` abstraction and its libsql implementation
//! - Domain events broadcast by the editing session
//!
//! # Tables
//!
//! - `catalog_nodes`: one parent-pointer row per node (immediate-write mode)
//! - `catalog_snapshots`: one versioned nested JSON document per catalog
//!   (draft mode, compare-and-swap on save)

pub mod catalog_store;
pub mod database;
mod error;
pub mod events;
mod turso_store;

pub use catalog_store::{CatalogStore, SnapshotWrite, StoredSnapshot};
pub use database::{DatabaseService, DbCatalogRowParams};
pub use error::DatabaseError;
pub use events::CatalogEvent;
pub use turso_store::TursoCatalogStore;
