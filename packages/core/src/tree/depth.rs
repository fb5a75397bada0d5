//! Level derivation for added and moved nodes
//!
//! A node's level is never set directly: it is the parent's level plus one,
//! or 1 at the root. When a subtree moves, the new level of its top node is
//! derived here and pushed down through every descendant. The depth check runs
//! before anything is moved, so a move that would push a descendant past
//! level 4 fails without touching the forest.

use crate::models::{CatalogNode, MAX_LEVEL};
use crate::operations::CatalogError;

/// Height of the subtree rooted at `node` (1 for a leaf)
pub fn subtree_height(node: &CatalogNode) -> usize {
    1 + node
        .children
        .iter()
        .map(subtree_height)
        .max()
        .unwrap_or(0)
}

/// Level a direct child of `parent` receives (1 for a root)
pub fn child_level(parent: Option<&CatalogNode>) -> usize {
    parent.map_or(1, |parent| parent.level as usize + 1)
}

/// Fail with `DepthExceeded` if a subtree of `height` placed at `level` would
/// reach past the maximum level
pub fn ensure_fits(node_id: &str, level: usize, height: usize) -> Result<(), CatalogError> {
    let deepest = level + height.saturating_sub(1);
    if deepest > MAX_LEVEL as usize {
        return Err(CatalogError::depth_exceeded(node_id, deepest));
    }
    Ok(())
}

/// Set `node.level` and recompute every descendant as parent + 1
///
/// Returns the ids whose level actually changed, in pre-order. Callers must
/// have run [`ensure_fits`] first; levels here are assumed to fit in 1..=4.
pub fn cascade_levels(node: &mut CatalogNode, level: u8) -> Vec<String> {
    let mut changed = Vec::new();
    cascade_into(node, level, &mut changed);
    changed
}

fn cascade_into(node: &mut CatalogNode, level: u8, changed: &mut Vec<String>) {
    if node.level != level {
        node.level = level;
        changed.push(node.id.clone());
    }
    for child in node.children.iter_mut() {
        cascade_into(child, level + 1, changed);
    }
}
