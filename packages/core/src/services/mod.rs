//! Business Services
//!
//! This module contains the catalog editing layer:
//!
//! - `CatalogService` - one editing session: mutations, saves and events
//! - `CatalogRepository` - persistence strategy (immediate rows or draft snapshot)
//! - `DraftAggregator` - dirty / last-saved / version state of a session
//! - `CatalogConfig` - environment-driven deployment settings
//!
//! Services coordinate between the tree engine and the database layer; the
//! tree rules themselves live in [`crate::tree`].

pub mod catalog_service;
pub mod config;
pub mod draft;
pub mod repository;

pub use catalog_service::{CatalogService, DEFAULT_SAVE_TIMEOUT};
pub use config::{CatalogConfig, ConfigError};
pub use draft::DraftAggregator;
pub use repository::{
    BatchedRepository, CatalogDocument, CatalogRepository, ImmediateRepository, LoadedCatalog,
    PersistenceMode, DEFAULT_SNAPSHOT_ID,
};
