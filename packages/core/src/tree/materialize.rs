//! Flat rows ⇄ forest conversion
//!
//! `catalog_nodes` stores one row per node with a parent pointer. The editor
//! works on a nested forest. [`materialize`] builds the forest from rows and
//! [`flatten`] turns it back into rows; `materialize(flatten(c)) == c` for any
//! valid catalog.
//!
//! # Orphan policy
//!
//! Rows whose parent is missing, and rows caught in a parent-pointer cycle, are
//! promoted to roots with a warning. No row is ever dropped silently.
//!
//! Sibling sort orders that collide after sorting (stored ties, or promoted
//! rows landing next to existing roots) are bumped to the next free value, so
//! the loaded forest always passes [`Catalog::validate`]. [`repaired_rows`]
//! lists the rows a load changed so flat storage can be brought in line.

use crate::models::{CatalogNode, CatalogRow, MAX_LEVEL};
use crate::operations::{CatalogError, ChangeSet};
use crate::tree::Catalog;
use std::collections::{HashMap, VecDeque};

/// Build a forest from flat rows
///
/// 1. Index every row by id (duplicate ids are a `CorruptCatalog` error)
/// 2. Resolve parents, promoting orphans and cycle members to roots
/// 3. Attach children and sort each sibling list by `sort_order` (stable),
///    bumping colliding orders so each list is strictly ascending
/// 4. Re-derive `level` from depth (depth above 4 is a `CorruptCatalog` error)
pub fn materialize(rows: Vec<CatalogRow>) -> Result<Catalog, CatalogError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if index.insert(row.id.as_str(), i).is_some() {
            return Err(CatalogError::corrupt_catalog(format!(
                "duplicate node id '{}'",
                row.id
            )));
        }
    }

    let mut parent_of: Vec<Option<usize>> = Vec::with_capacity(rows.len());
    for row in &rows {
        let parent = match row.parent_id.as_deref() {
            None => None,
            Some(parent_id) => match index.get(parent_id) {
                Some(&parent) => Some(parent),
                None => {
                    tracing::warn!(
                        "Catalog row '{}' references missing parent '{}'; promoting to root",
                        row.id,
                        parent_id
                    );
                    None
                }
            },
        };
        parent_of.push(parent);
    }
    drop(index);

    break_cycles(&rows, &mut parent_of);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
    let mut roots = Vec::new();
    for (i, parent) in parent_of.iter().enumerate() {
        match parent {
            Some(parent) => children[*parent].push(i),
            None => roots.push(i),
        }
    }

    let mut orders: Vec<i64> = rows.iter().map(|row| row.sort_order).collect();
    roots.sort_by_key(|&i| orders[i]);
    separate_orders(&roots, &mut orders, &rows);
    for list in children.iter_mut() {
        list.sort_by_key(|&i| orders[i]);
        separate_orders(list, &mut orders, &rows);
    }

    let mut slots: Vec<Option<CatalogRow>> = rows.into_iter().map(Some).collect();
    let mut forest = Vec::with_capacity(roots.len());
    for root in roots {
        forest.push(build(root, None, 1, &mut slots, &children, &orders)?);
    }

    Ok(Catalog::from_roots(forest))
}

/// Bump every order that does not exceed its predecessor in a sorted sibling list
fn separate_orders(list: &[usize], orders: &mut [i64], rows: &[CatalogRow]) {
    let mut previous: Option<i64> = None;
    for &i in list {
        if let Some(previous) = previous {
            if orders[i] <= previous {
                tracing::warn!(
                    "Catalog row '{}' sort order {} collides with its previous sibling; using {}",
                    rows[i].id,
                    orders[i],
                    previous + 1
                );
                orders[i] = previous + 1;
            }
        }
        previous = Some(orders[i]);
    }
}

/// Promote rows unreachable from any root (parent-pointer cycles)
///
/// Walks reachability from the current roots; the first unreached row in
/// input order is promoted, its subtree marked reached, and the scan goes on.
fn break_cycles(rows: &[CatalogRow], parent_of: &mut [Option<usize>]) {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
    for (i, parent) in parent_of.iter().enumerate() {
        if let Some(parent) = parent {
            children[*parent].push(i);
        }
    }

    let mut reached = vec![false; rows.len()];
    let mut queue: VecDeque<usize> = parent_of
        .iter()
        .enumerate()
        .filter(|(_, parent)| parent.is_none())
        .map(|(i, _)| i)
        .collect();
    mark_reached(&mut queue, &children, &mut reached);

    for i in 0..rows.len() {
        if reached[i] {
            continue;
        }
        tracing::warn!(
            "Catalog row '{}' is part of a parent cycle; promoting to root",
            rows[i].id
        );
        parent_of[i] = None;
        queue.push_back(i);
        mark_reached(&mut queue, &children, &mut reached);
    }
}

fn mark_reached(queue: &mut VecDeque<usize>, children: &[Vec<usize>], reached: &mut [bool]) {
    while let Some(i) = queue.pop_front() {
        if reached[i] {
            continue;
        }
        reached[i] = true;
        queue.extend(children[i].iter().copied().filter(|&c| !reached[c]));
    }
}

fn build(
    i: usize,
    parent_id: Option<&str>,
    depth: usize,
    slots: &mut [Option<CatalogRow>],
    children: &[Vec<usize>],
    orders: &[i64],
) -> Result<CatalogNode, CatalogError> {
    let row = slots[i]
        .take()
        .ok_or_else(|| CatalogError::corrupt_catalog("row visited twice while materializing"))?;

    if depth > MAX_LEVEL as usize {
        return Err(CatalogError::corrupt_catalog(format!(
            "node '{}' sits at depth {} (maximum {})",
            row.id, depth, MAX_LEVEL
        )));
    }
    if row.level as usize != depth {
        tracing::warn!(
            "Catalog row '{}' stored level {} but sits at depth {}; using depth",
            row.id,
            row.level,
            depth
        );
    }

    let mut node = CatalogNode::from_row(row);
    node.parent_id = parent_id.map(str::to_string);
    node.level = depth as u8;
    node.sort_order = orders[i];

    let mut built = Vec::with_capacity(children[i].len());
    for &child in &children[i] {
        built.push(build(child, Some(&node.id), depth + 1, slots, children, orders)?);
    }
    node.children = built;

    Ok(node)
}

/// Flatten a forest into parent-pointer rows, pre-order
///
/// Each row carries the node's current parent and sort order. The level is
/// taken from the actual depth; a stored level that disagrees is a bug in the
/// mutator, caught by a debug assertion.
pub fn flatten(catalog: &Catalog) -> Vec<CatalogRow> {
    let mut rows = Vec::with_capacity(catalog.len());
    for root in catalog.roots() {
        flatten_into(root, None, 1, &mut rows);
    }
    rows
}

fn flatten_into(node: &CatalogNode, parent_id: Option<&str>, depth: u8, rows: &mut Vec<CatalogRow>) {
    debug_assert_eq!(
        node.level, depth,
        "level of '{}' out of sync with its depth",
        node.id
    );
    debug_assert_eq!(node.parent_id.as_deref(), parent_id);

    let mut row = node.to_row();
    row.parent_id = parent_id.map(str::to_string);
    row.level = depth;
    rows.push(row);

    for child in &node.children {
        flatten_into(child, Some(&node.id), depth + 1, rows);
    }
}

/// Update rows for every node whose parent, level or sort order differs from
/// what `stored` says
///
/// `catalog` is expected to be `materialize(stored)`; the result is empty when
/// the stored rows were already consistent.
pub fn repaired_rows(stored: &[CatalogRow], catalog: &Catalog) -> ChangeSet {
    let by_id: HashMap<&str, &CatalogRow> =
        stored.iter().map(|row| (row.id.as_str(), row)).collect();

    let mut changes = ChangeSet::new();
    for row in flatten(catalog) {
        let unchanged = by_id.get(row.id.as_str()).is_some_and(|old| {
            old.parent_id == row.parent_id
                && old.level == row.level
                && old.sort_order == row.sort_order
        });
        if !unchanged {
            changes.update(row);
        }
    }
    changes
}

/// Rows for a nested document whose stored levels and parent ids are not trusted
///
/// Parent ids come from where each node sits in the document, so the result
/// can go straight into [`materialize`] for full re-validation.
pub fn rows_from_nested(roots: Vec<CatalogNode>) -> Vec<CatalogRow> {
    let mut rows = Vec::new();
    for root in roots {
        nested_into(root, None, &mut rows);
    }
    rows
}

fn nested_into(mut node: CatalogNode, parent_id: Option<&str>, rows: &mut Vec<CatalogRow>) {
    let children = std::mem::take(&mut node.children);
    node.parent_id = parent_id.map(str::to_string);
    let id = node.id.clone();
    rows.push(node.to_row());
    for child in children {
        nested_into(child, Some(&id), rows);
    }
}
