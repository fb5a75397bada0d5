//! Catalog Service - Editing Session
//!
//! This module provides the business logic layer for one catalog editing
//! session:
//!
//! - Structural operations (add, update, remove, clone, reorder, reparent)
//! - Explicit saves for draft-mode catalogs
//! - Domain events for subscribers
//!
//! # Commit Protocol
//!
//! Every mutation runs against a working copy of the forest. The resulting
//! row changes go to the repository first; only when that succeeds is the
//! working copy committed and an event broadcast. A structural error or a
//! persistence failure therefore leaves the session exactly as it was.
//!
//! Methods take `&mut self`: a session has a single writer. Persistence calls
//! are bounded by the configured timeout and never retried automatically.

use crate::db::CatalogEvent;
use crate::models::{CatalogNode, NewNode, NodePatch};
use crate::operations::{CatalogError, ChangeSet, PersistenceOperation};
use crate::services::draft::DraftAggregator;
use crate::services::repository::{CatalogRepository, PersistenceMode};
use crate::tree::{Catalog, CatalogStats, CloneMode, DeleteResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the domain event channel
const CATALOG_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Default bound on a single persistence call
pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(10);

/// One editing session over a catalog
///
/// # Examples
///
/// ```no_run
/// use carecatalog_core::db::{DatabaseService, TursoCatalogStore};
/// use carecatalog_core::models::NewNode;
/// use carecatalog_core::services::{CatalogService, ImmediateRepository};
/// use std::path::PathBuf;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/catalog.db")).await?);
///     let store = Arc::new(TursoCatalogStore::new(db));
///     let repository = Arc::new(ImmediateRepository::new(store));
///
///     let mut session = CatalogService::open(repository).await?;
///     let service = session.add_node(None, NewNode::named("Home Nursing")).await?;
///     session.add_node(Some(&service.id), NewNode::named("Weekly Visit")).await?;
///     Ok(())
/// }
/// ```
pub struct CatalogService {
    repository: Arc<dyn CatalogRepository>,
    draft: DraftAggregator,
    clone_mode: CloneMode,
    save_timeout: Duration,
    event_tx: broadcast::Sender<CatalogEvent>,
}

impl CatalogService {
    /// Load the catalog from `repository` and start a session on it
    pub async fn open(repository: Arc<dyn CatalogRepository>) -> Result<Self, CatalogError> {
        Self::open_with(repository, CloneMode::default(), DEFAULT_SAVE_TIMEOUT).await
    }

    /// Like [`open`](Self::open) with an explicit clone mode and persistence timeout
    pub async fn open_with(
        repository: Arc<dyn CatalogRepository>,
        clone_mode: CloneMode,
        save_timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let loaded = match tokio::time::timeout(save_timeout, repository.load_catalog()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CatalogError::persistence_failure(
                    PersistenceOperation::LoadCatalog,
                    None,
                    format!("timed out after {:?}", save_timeout),
                ))
            }
        };

        let (event_tx, _) = broadcast::channel(CATALOG_EVENT_CHANNEL_CAPACITY);

        tracing::info!(
            "Opened {} catalog session ({} node(s), version {})",
            repository.mode(),
            loaded.catalog.len(),
            loaded.version
        );

        Ok(Self {
            repository,
            draft: DraftAggregator::new(loaded.catalog, loaded.version, loaded.saved_at),
            clone_mode,
            save_timeout,
            event_tx,
        })
    }

    //
    // READS
    //

    pub fn catalog(&self) -> &Catalog {
        self.draft.catalog()
    }

    pub fn node(&self, id: &str) -> Option<&CatalogNode> {
        self.draft.catalog().get(id)
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats::collect(self.draft.catalog())
    }

    pub fn mode(&self) -> PersistenceMode {
        self.repository.mode()
    }

    pub fn clone_mode(&self) -> CloneMode {
        self.clone_mode
    }

    /// Whether draft edits are waiting for [`save`](Self::save)
    pub fn is_dirty(&self) -> bool {
        self.draft.is_dirty()
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.draft.last_saved_at()
    }

    /// Snapshot version this session descends from
    pub fn version(&self) -> u64 {
        self.draft.version()
    }

    /// Subscribe to domain events
    ///
    /// Events are only sent for changes that were accepted by the repository.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<CatalogEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores send errors; having no subscribers is normal
    fn emit_event(&self, event: CatalogEvent) {
        let _ = self.event_tx.send(event);
    }

    //
    // MUTATIONS
    //

    /// Add a node as the last child of `parent_id` (or as the last root)
    pub async fn add_node(
        &mut self,
        parent_id: Option<&str>,
        data: NewNode,
    ) -> Result<CatalogNode, CatalogError> {
        let mut working = self.draft.working_copy();
        let (node, changes) = working.add_node(parent_id, data)?;
        self.commit(working, &changes).await?;

        self.emit_event(CatalogEvent::NodeAdded { node: node.clone() });
        Ok(node)
    }

    /// Edit a node's fields
    pub async fn update_node(
        &mut self,
        id: &str,
        patch: NodePatch,
    ) -> Result<CatalogNode, CatalogError> {
        let mut working = self.draft.working_copy();
        let (node, changes) = working.update_node(id, patch)?;
        if changes.is_empty() {
            return Ok(node);
        }
        self.commit(working, &changes).await?;

        self.emit_event(CatalogEvent::NodeUpdated { node: node.clone() });
        Ok(node)
    }

    /// Remove a node and its whole subtree; a missing id is not an error
    pub async fn remove_node(&mut self, id: &str) -> Result<DeleteResult, CatalogError> {
        let mut working = self.draft.working_copy();
        let (result, changes) = working.remove_node(id);
        if !result.existed {
            return Ok(result);
        }
        self.commit(working, &changes).await?;

        self.emit_event(CatalogEvent::SubtreeRemoved {
            removed_ids: result.removed_ids.clone(),
        });
        Ok(result)
    }

    /// Clone a node next to itself using the session's clone mode
    pub async fn clone_node(&mut self, id: &str) -> Result<CatalogNode, CatalogError> {
        let mut working = self.draft.working_copy();
        let (copy, changes) = working.clone_node(id, self.clone_mode)?;
        self.commit(working, &changes).await?;

        self.emit_event(CatalogEvent::NodeAdded { node: copy.clone() });
        Ok(copy)
    }

    /// Put the children of `parent_id` in the order given by `ordered_ids`
    pub async fn reorder_siblings(
        &mut self,
        parent_id: Option<&str>,
        ordered_ids: &[String],
    ) -> Result<(), CatalogError> {
        let mut working = self.draft.working_copy();
        let changes = working.reorder_siblings(parent_id, ordered_ids)?;
        if changes.is_empty() {
            return Ok(());
        }
        self.commit(working, &changes).await?;

        self.emit_event(CatalogEvent::SiblingsReordered {
            parent_id: parent_id.map(str::to_string),
            ordered_ids: ordered_ids.to_vec(),
        });
        Ok(())
    }

    /// Move a node with its subtree under `new_parent_id` (or to the roots)
    ///
    /// Returns the moved node without its children.
    pub async fn reparent_node(
        &mut self,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<CatalogNode, CatalogError> {
        let mut working = self.draft.working_copy();
        let changes = working.reparent_node(id, new_parent_id)?;
        let moved = working
            .get(id)
            .map(CatalogNode::detached)
            .ok_or_else(|| CatalogError::node_not_found(id))?;
        if changes.is_empty() {
            return Ok(moved);
        }
        self.commit(working, &changes).await?;

        self.emit_event(CatalogEvent::NodeMoved {
            node_id: moved.id.clone(),
            new_parent_id: moved.parent_id.clone(),
            level: moved.level,
        });
        Ok(moved)
    }

    /// Save the whole catalog
    ///
    /// In draft mode this writes one snapshot with compare-and-swap on the
    /// version the session descends from; a clean session has nothing to save.
    /// In flat mode every change is already stored and this returns at once.
    ///
    /// On failure (including timeout) the session stays dirty and unchanged.
    pub async fn save(&mut self) -> Result<u64, CatalogError> {
        if !self.draft.is_dirty() {
            tracing::debug!("Catalog has no unsaved changes");
            return Ok(self.draft.version());
        }

        let expected_version = self.draft.version();
        let save = self
            .repository
            .save_catalog(self.draft.catalog(), expected_version);
        let version = match tokio::time::timeout(self.save_timeout, save).await {
            Ok(Ok(version)) => version,
            Ok(Err(err)) => {
                tracing::warn!("Catalog save failed; edits kept in memory: {}", err);
                return Err(err);
            }
            Err(_) => {
                let err = CatalogError::persistence_failure(
                    PersistenceOperation::SaveCatalog,
                    None,
                    format!("timed out after {:?}", self.save_timeout),
                );
                tracing::warn!("{}; edits kept in memory", err);
                return Err(err);
            }
        };

        self.draft.mark_saved(version, Utc::now());
        self.emit_event(CatalogEvent::CatalogSaved { version });
        Ok(version)
    }

    /// Hand the changes to the repository, then commit the working copy
    async fn commit(&mut self, working: Catalog, changes: &ChangeSet) -> Result<(), CatalogError> {
        let record = self.repository.record_changes(changes);
        match tokio::time::timeout(self.save_timeout, record).await {
            Ok(result) => result?,
            Err(_) => {
                let operation = changes
                    .iter()
                    .next()
                    .map(|change| change.operation())
                    .unwrap_or(PersistenceOperation::SaveCatalog);
                let err = CatalogError::persistence_failure(
                    operation,
                    None,
                    format!("timed out after {:?}", self.save_timeout),
                );
                tracing::warn!("{}", err);
                return Err(err);
            }
        }

        match self.repository.mode() {
            PersistenceMode::Immediate => self.draft.replace(working),
            PersistenceMode::Draft => self.draft.stage(working),
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "catalog_service_test.rs"]
mod catalog_service_test;
