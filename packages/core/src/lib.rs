//! CareCatalog Core - Service Catalog Tree Engine
//!
//! This crate provides the data model, tree algorithms and persistence for a
//! hierarchical healthcare service catalog: services contain plans, plans
//! contain add-ons, add-ons contain sub-add-ons (at most four levels).
//!
//! # Architecture
//!
//! - **Forest in memory**: the editor works on owned nested nodes (`tree::Catalog`)
//! - **Flat rows on disk**: `catalog_nodes` keeps one parent-pointer row per node
//! - **Two persistence modes**: immediate per-operation writes, or a draft saved
//!   as one versioned snapshot with compare-and-swap
//! - **libsql/Turso**: Embedded SQLite-compatible database
//!
//! # Modules
//!
//! - [`models`] - Data structures (CatalogNode, CatalogRow, NewNode, NodePatch)
//! - [`tree`] - Forest, materializer, mutator, depth resolver, statistics
//! - [`operations`] - Error taxonomy and row-level change sets
//! - [`db`] - Database layer with libsql integration
//! - [`services`] - Editing session, repositories, configuration

pub mod db;
pub mod models;
pub mod operations;
pub mod services;
pub mod tree;

// Re-export commonly used types
pub use models::*;
pub use operations::{CatalogError, ChangeSet, RowChange};
pub use services::*;
pub use tree::{Catalog, CatalogStats, CloneMode, DeleteResult};
