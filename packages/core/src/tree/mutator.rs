//! Tree Mutator
//!
//! Structural edits on a [`Catalog`]. Every operation validates first and only
//! then changes the forest, so a failed call leaves the catalog exactly as it
//! was. Each successful call returns the [`ChangeSet`] of rows it touched.
//!
//! The catalog service runs these on a working copy and swaps it in once the
//! repository has accepted the changes (single writer per session).

use crate::models::{CatalogNode, NewNode, NodePatch};
use crate::operations::{CatalogError, ChangeSet};
use crate::tree::depth::{cascade_levels, child_level, ensure_fits, subtree_height};
use crate::tree::Catalog;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Suffix appended to the name of a cloned node
const CLONE_NAME_SUFFIX: &str = " (Copy)";

/// How `clone_node` treats the source's descendants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneMode {
    /// Copy only the node itself; the clone starts without children
    #[default]
    Shallow,
    /// Copy the node and its whole subtree, every copy with a fresh id
    Deep,
}

/// Result of a delete operation
///
/// Deleting is idempotent: a missing id succeeds with `existed = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub existed: bool,
    /// The removed node followed by its descendants, pre-order
    pub removed_ids: Vec<String>,
}

impl DeleteResult {
    pub fn not_found() -> Self {
        Self {
            existed: false,
            removed_ids: Vec::new(),
        }
    }
}

fn next_sort_order(siblings: &[CatalogNode]) -> i64 {
    siblings
        .iter()
        .map(|node| node.sort_order)
        .max()
        .map_or(0, |max| max + 1)
}

impl Catalog {
    /// Add a node as the last child of `parent_id` (or as the last root)
    ///
    /// # Errors
    ///
    /// - `ParentNotFound` if `parent_id` is unknown
    /// - `DepthExceeded` if the parent already sits at level 4
    pub fn add_node(
        &mut self,
        parent_id: Option<&str>,
        data: NewNode,
    ) -> Result<(CatalogNode, ChangeSet), CatalogError> {
        let parent = match parent_id {
            Some(id) => Some(
                self.get(id)
                    .ok_or_else(|| CatalogError::parent_not_found(id))?,
            ),
            None => None,
        };
        let level = child_level(parent);
        let id = self.fresh_id();
        ensure_fits(&id, level, 1)?;

        let siblings = self
            .children_of_mut(parent_id)
            .ok_or_else(|| CatalogError::parent_not_found(parent_id.unwrap_or_default()))?;
        let node = CatalogNode::from_new(
            id,
            parent_id.map(str::to_string),
            level as u8,
            next_sort_order(siblings),
            data,
        );
        siblings.push(node.clone());

        let mut changes = ChangeSet::new();
        changes.insert(node.to_row());

        tracing::debug!(
            "Added catalog node '{}' at level {} under {:?}",
            node.id,
            node.level,
            parent_id
        );
        Ok((node, changes))
    }

    /// Apply a field patch to one node
    ///
    /// Never changes `parent_id`, `level`, `sort_order` or `children`.
    pub fn update_node(
        &mut self,
        id: &str,
        patch: NodePatch,
    ) -> Result<(CatalogNode, ChangeSet), CatalogError> {
        let node = self
            .get_mut(id)
            .ok_or_else(|| CatalogError::node_not_found(id))?;

        let mut changes = ChangeSet::new();
        if !patch.is_empty() {
            node.apply_patch(patch);
            changes.update(node.to_row());
        }

        Ok((node.detached(), changes))
    }

    /// Remove a node together with its entire subtree
    ///
    /// Idempotent: an unknown id is a successful no-op. Row deletes are emitted
    /// leaf-first. Remaining siblings keep their sort orders.
    pub fn remove_node(&mut self, id: &str) -> (DeleteResult, ChangeSet) {
        let Some(removed) = self.detach(id) else {
            tracing::debug!("Remove of unknown catalog node '{}' ignored", id);
            return (DeleteResult::not_found(), ChangeSet::new());
        };

        let removed_ids = removed.subtree_ids();
        let mut changes = ChangeSet::new();
        for removed_id in removed_ids.iter().rev() {
            changes.delete(removed_id.clone());
        }

        tracing::debug!(
            "Removed catalog node '{}' with {} descendant(s)",
            id,
            removed_ids.len() - 1
        );
        (
            DeleteResult {
                existed: true,
                removed_ids,
            },
            changes,
        )
    }

    /// Clone a node as its next sibling
    ///
    /// The copy gets a fresh id, the source name plus `" (Copy)"`, copied
    /// scalar fields and fresh timestamps. It is placed directly after the
    /// source; later siblings move down by one. With [`CloneMode::Shallow`]
    /// the copy has no children, with [`CloneMode::Deep`] the subtree is
    /// copied with fresh ids throughout.
    pub fn clone_node(
        &mut self,
        id: &str,
        mode: CloneMode,
    ) -> Result<(CatalogNode, ChangeSet), CatalogError> {
        let source = self
            .get(id)
            .ok_or_else(|| CatalogError::node_not_found(id))?;
        let parent_id = source.parent_id.clone();
        let source_order = source.sort_order;

        let mut copy = match mode {
            CloneMode::Shallow => source.detached(),
            CloneMode::Deep => source.clone(),
        };
        let mut used = HashSet::new();
        self.reassign_ids(&mut copy, parent_id.clone(), &mut used);
        copy.name.push_str(CLONE_NAME_SUFFIX);
        copy.sort_order = source_order + 1;

        let siblings = self
            .children_of_mut(parent_id.as_deref())
            .ok_or_else(|| CatalogError::node_not_found(id))?;
        let position = siblings
            .iter()
            .position(|node| node.id == id)
            .ok_or_else(|| CatalogError::node_not_found(id))?;

        let mut changes = ChangeSet::new();
        let now = Utc::now();
        for sibling in siblings.iter_mut().skip(position + 1) {
            sibling.sort_order += 1;
            sibling.updated_at = now;
            changes.update(sibling.to_row());
        }
        copy.walk(&mut |node| changes.insert(node.to_row()));
        siblings.insert(position + 1, copy.clone());

        tracing::debug!(
            "Cloned catalog node '{}' as '{}' ({:?})",
            id,
            copy.id,
            mode
        );
        Ok((copy, changes))
    }

    /// Give `node` and its descendants fresh ids and timestamps
    fn reassign_ids(
        &self,
        node: &mut CatalogNode,
        parent_id: Option<String>,
        used: &mut HashSet<String>,
    ) {
        let mut id = self.fresh_id();
        while !used.insert(id.clone()) {
            id = self.fresh_id();
        }
        let now = Utc::now();
        node.id = id;
        node.parent_id = parent_id;
        node.created_at = now;
        node.updated_at = now;

        let own_id = node.id.clone();
        for child in node.children.iter_mut() {
            self.reassign_ids(child, Some(own_id.clone()), used);
        }
    }

    /// Rewrite the sort orders of a parent's children to follow `ordered_ids`
    ///
    /// `ordered_ids` must be exactly a permutation of the current children:
    /// no missing, unknown or repeated ids. Orders become `0..n`.
    ///
    /// # Errors
    ///
    /// - `ParentNotFound` if `parent_id` is unknown
    /// - `SiblingSetMismatch` if the list is not a permutation of the children
    pub fn reorder_siblings(
        &mut self,
        parent_id: Option<&str>,
        ordered_ids: &[String],
    ) -> Result<ChangeSet, CatalogError> {
        let siblings = self
            .children_of(parent_id)
            .ok_or_else(|| CatalogError::parent_not_found(parent_id.unwrap_or_default()))?;

        let current: HashSet<&str> = siblings.iter().map(|node| node.id.as_str()).collect();
        let mut requested = HashSet::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            if !requested.insert(id.as_str()) {
                return Err(CatalogError::sibling_set_mismatch(
                    parent_id,
                    format!("'{}' appears more than once", id),
                ));
            }
            if !current.contains(id.as_str()) {
                return Err(CatalogError::sibling_set_mismatch(
                    parent_id,
                    format!("'{}' is not a child", id),
                ));
            }
        }
        if let Some(missing) = siblings
            .iter()
            .find(|node| !requested.contains(node.id.as_str()))
        {
            return Err(CatalogError::sibling_set_mismatch(
                parent_id,
                format!("'{}' is missing from the new order", missing.id),
            ));
        }

        let siblings = self
            .children_of_mut(parent_id)
            .ok_or_else(|| CatalogError::parent_not_found(parent_id.unwrap_or_default()))?;
        let mut by_id: HashMap<String, CatalogNode> = siblings
            .drain(..)
            .map(|node| (node.id.clone(), node))
            .collect();

        let mut changes = ChangeSet::new();
        let now = Utc::now();
        for (position, id) in ordered_ids.iter().enumerate() {
            let Some(mut node) = by_id.remove(id) else {
                continue;
            };
            let order = position as i64;
            if node.sort_order != order {
                node.sort_order = order;
                node.updated_at = now;
                changes.update(node.to_row());
            }
            siblings.push(node);
        }

        tracing::debug!(
            "Reordered {} sibling(s) under {:?}",
            ordered_ids.len(),
            parent_id
        );
        Ok(changes)
    }

    /// Move a node, with its subtree intact, under `new_parent_id`
    ///
    /// The node becomes the last child of its new parent and every level in
    /// the subtree is recomputed. Moving to the current parent is a no-op.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if `id` is unknown
    /// - `CycleDetected` if `new_parent_id` is the node itself or a descendant
    /// - `ParentNotFound` if `new_parent_id` is unknown
    /// - `DepthExceeded` if any descendant would land past level 4
    pub fn reparent_node(
        &mut self,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<ChangeSet, CatalogError> {
        let node = self
            .get(id)
            .ok_or_else(|| CatalogError::node_not_found(id))?;

        if node.parent_id.as_deref() == new_parent_id {
            return Ok(ChangeSet::new());
        }

        let new_parent = match new_parent_id {
            None => None,
            Some(parent_id) => {
                if parent_id == id || node.subtree_ids().iter().any(|d| d == parent_id) {
                    return Err(CatalogError::cycle_detected(id, parent_id));
                }
                Some(
                    self.get(parent_id)
                        .ok_or_else(|| CatalogError::parent_not_found(parent_id))?,
                )
            }
        };
        let level = child_level(new_parent);
        ensure_fits(id, level, subtree_height(node))?;

        let destination = self
            .children_of(new_parent_id)
            .ok_or_else(|| CatalogError::parent_not_found(new_parent_id.unwrap_or_default()))?;
        let sort_order = next_sort_order(destination);

        // Validation is complete; from here on the move cannot fail.
        let Some(mut moved) = self.detach(id) else {
            return Err(CatalogError::node_not_found(id));
        };
        moved.parent_id = new_parent_id.map(str::to_string);
        moved.sort_order = sort_order;
        moved.updated_at = Utc::now();
        let relevelled = cascade_levels(&mut moved, level as u8);

        let mut changes = ChangeSet::new();
        changes.update(moved.to_row());
        let now = moved.updated_at;
        for descendant in moved.children.iter_mut() {
            touch_relevelled(descendant, &relevelled, now, &mut changes);
        }

        match self.children_of_mut(new_parent_id) {
            Some(siblings) => siblings.push(moved),
            None => {
                return Err(CatalogError::parent_not_found(
                    new_parent_id.unwrap_or_default(),
                ))
            }
        }

        tracing::debug!(
            "Moved catalog node '{}' under {:?} at level {} ({} descendant level change(s))",
            id,
            new_parent_id,
            level,
            relevelled.iter().filter(|changed| changed.as_str() != id).count()
        );
        Ok(changes)
    }
}

/// Refresh `updated_at` and emit an update row for every relevelled descendant
fn touch_relevelled(
    node: &mut CatalogNode,
    relevelled: &[String],
    now: chrono::DateTime<Utc>,
    changes: &mut ChangeSet,
) {
    if relevelled.iter().any(|id| id == &node.id) {
        node.updated_at = now;
        changes.update(node.to_row());
    }
    for child in node.children.iter_mut() {
        touch_relevelled(child, relevelled, now, changes);
    }
}
