//! Draft Aggregator
//!
//! Session state around the in-memory forest: the committed catalog, whether
//! it has unsaved edits, when it was last saved and which snapshot version it
//! descends from. Saving is always explicit; nothing here triggers a write.

use crate::tree::Catalog;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct DraftAggregator {
    catalog: Catalog,
    dirty: bool,
    last_saved_at: Option<DateTime<Utc>>,
    version: u64,
}

impl DraftAggregator {
    pub fn new(catalog: Catalog, version: u64, last_saved_at: Option<DateTime<Utc>>) -> Self {
        Self {
            catalog,
            dirty: false,
            last_saved_at,
            version,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Clone of the committed forest for a mutation to run against
    pub fn working_copy(&self) -> Catalog {
        self.catalog.clone()
    }

    /// Commit an edited forest that still has to be saved
    pub fn stage(&mut self, catalog: Catalog) {
        self.catalog = catalog;
        self.dirty = true;
    }

    /// Commit an edited forest that storage already holds
    pub fn replace(&mut self, catalog: Catalog) {
        self.catalog = catalog;
    }

    /// Record a successful save of the current forest
    pub fn mark_saved(&mut self, version: u64, saved_at: DateTime<Utc>) {
        self.version = version;
        self.last_saved_at = Some(saved_at);
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
