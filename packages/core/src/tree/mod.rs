//! Catalog Forest
//!
//! The in-memory catalog is a forest of [`CatalogNode`] trees. This module owns
//! the `Catalog` value and its lookups; the algorithms live in submodules:
//!
//! - [`materialize`] - flat rows ⇄ forest conversion
//! - [`mutator`] - add, update, remove, clone, reorder and reparent
//! - [`depth`] - level derivation and cascade for moved subtrees
//! - [`stats`] - read-only counts for presentation layers
//!
//! # Invariants
//!
//! After every committed mutation:
//!
//! 1. Every id is unique within the catalog
//! 2. Every `parent_id` resolves to the node that actually holds the child
//! 3. No node is its own ancestor
//! 4. `level` is 1 for roots and `parent.level + 1` otherwise, never above 4
//! 5. Sibling `sort_order` values are distinct and ascending in `children`
//!
//! [`Catalog::validate`] checks all five.

pub mod depth;
pub mod materialize;
pub mod mutator;
pub mod stats;

pub use materialize::{flatten, materialize, repaired_rows, rows_from_nested};
pub use mutator::{CloneMode, DeleteResult};
pub use stats::{CatalogStats, KindCounts};

use crate::models::{CatalogNode, MAX_LEVEL};
use crate::operations::CatalogError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// The full forest of catalog nodes for one editing session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    roots: Vec<CatalogNode>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap already-shaped roots; callers are expected to [`validate`](Self::validate)
    pub(crate) fn from_roots(roots: Vec<CatalogNode>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[CatalogNode] {
        &self.roots
    }

    pub fn into_roots(self) -> Vec<CatalogNode> {
        self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total number of nodes across all trees
    pub fn len(&self) -> usize {
        self.roots.iter().map(CatalogNode::subtree_len).sum()
    }

    pub fn get(&self, id: &str) -> Option<&CatalogNode> {
        find(&self.roots, id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut CatalogNode> {
        find_mut(&mut self.roots, id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Direct children of `parent_id`, or the root list for `None`
    ///
    /// Returns `None` only when the parent id is unknown.
    pub fn children_of(&self, parent_id: Option<&str>) -> Option<&[CatalogNode]> {
        match parent_id {
            None => Some(&self.roots),
            Some(id) => self.get(id).map(|node| node.children.as_slice()),
        }
    }

    pub(crate) fn children_of_mut(
        &mut self,
        parent_id: Option<&str>,
    ) -> Option<&mut Vec<CatalogNode>> {
        match parent_id {
            None => Some(&mut self.roots),
            Some(id) => self.get_mut(id).map(|node| &mut node.children),
        }
    }

    /// Remove the node with `id` (and its subtree) from wherever it lives
    pub(crate) fn detach(&mut self, id: &str) -> Option<CatalogNode> {
        detach(&mut self.roots, id)
    }

    /// Ids from the root down to `id` (inclusive), `None` if absent
    pub fn path_to(&self, id: &str) -> Option<Vec<String>> {
        let mut path = Vec::new();
        if path_to(&self.roots, id, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    /// All nodes in pre-order
    pub fn nodes(&self) -> Vec<&CatalogNode> {
        let mut out = Vec::with_capacity(self.len());
        for root in &self.roots {
            root.walk(&mut |node| out.push(node));
        }
        out
    }

    /// Generate an id not yet used anywhere in the catalog
    pub(crate) fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.contains(&id) {
                return id;
            }
        }
    }

    /// Check every forest invariant, reporting the first violation
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        validate_siblings(&self.roots, None, 1, &mut seen)
    }
}

fn find<'a>(nodes: &'a [CatalogNode], id: &str) -> Option<&'a CatalogNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find(&node.children, id) {
            return Some(found);
        }
    }
    None
}

fn find_mut<'a>(nodes: &'a mut [CatalogNode], id: &str) -> Option<&'a mut CatalogNode> {
    for node in nodes.iter_mut() {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

fn detach(nodes: &mut Vec<CatalogNode>, id: &str) -> Option<CatalogNode> {
    if let Some(pos) = nodes.iter().position(|node| node.id == id) {
        return Some(nodes.remove(pos));
    }
    for node in nodes.iter_mut() {
        if let Some(found) = detach(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

fn path_to(nodes: &[CatalogNode], id: &str, path: &mut Vec<String>) -> bool {
    for node in nodes {
        path.push(node.id.clone());
        if node.id == id || path_to(&node.children, id, path) {
            return true;
        }
        path.pop();
    }
    false
}

fn validate_siblings(
    siblings: &[CatalogNode],
    parent_id: Option<&str>,
    level: usize,
    seen: &mut HashSet<String>,
) -> Result<(), CatalogError> {
    let mut previous_order: Option<i64> = None;

    for node in siblings {
        if !seen.insert(node.id.clone()) {
            return Err(CatalogError::corrupt_catalog(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        if node.parent_id.as_deref() != parent_id {
            return Err(CatalogError::corrupt_catalog(format!(
                "node '{}' records parent {:?} but is held by {:?}",
                node.id, node.parent_id, parent_id
            )));
        }
        if level > MAX_LEVEL as usize {
            return Err(CatalogError::depth_exceeded(&node.id, level));
        }
        if node.level as usize != level {
            return Err(CatalogError::corrupt_catalog(format!(
                "node '{}' has level {} at depth {}",
                node.id, node.level, level
            )));
        }
        if let Some(previous) = previous_order {
            if node.sort_order <= previous {
                return Err(CatalogError::corrupt_catalog(format!(
                    "sort order {} of '{}' collides with or precedes its previous sibling",
                    node.sort_order, node.id
                )));
            }
        }
        previous_order = Some(node.sort_order);

        validate_siblings(&node.children, Some(&node.id), level + 1, seen)?;
    }

    Ok(())
}
