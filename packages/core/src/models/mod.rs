//! Data Models
//!
//! This module contains the core data structures of the catalog engine:
//!
//! - `CatalogNode` - Tree form of a catalog entry (service, plan, add-on, sub-add-on)
//! - `CatalogRow` - Flat parent-pointer form stored in the `catalog_nodes` table
//! - `NewNode` / `NodePatch` - Typed inputs for add and edit operations

mod catalog_node;

pub use catalog_node::{CatalogNode, CatalogRow, NewNode, NodeKind, NodePatch, MAX_LEVEL};
