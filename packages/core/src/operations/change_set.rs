//! Row-level change sets
//!
//! Every tree mutation reports the rows it touched as an ordered `ChangeSet`.
//! The immediate-write repository replays it against `catalog_nodes`; the
//! draft repository ignores it and saves the whole document later.

use crate::models::CatalogRow;
use crate::operations::PersistenceOperation;

/// One row-level write produced by a mutation
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Insert(CatalogRow),
    Update(CatalogRow),
    Delete { id: String },
}

impl RowChange {
    pub fn node_id(&self) -> &str {
        match self {
            Self::Insert(row) | Self::Update(row) => &row.id,
            Self::Delete { id } => id,
        }
    }

    pub fn operation(&self) -> PersistenceOperation {
        match self {
            Self::Insert(_) => PersistenceOperation::InsertRow,
            Self::Update(_) => PersistenceOperation::UpdateRow,
            Self::Delete { .. } => PersistenceOperation::DeleteRow,
        }
    }
}

/// Ordered row writes for a single mutation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<RowChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row: CatalogRow) {
        self.changes.push(RowChange::Insert(row));
    }

    pub fn update(&mut self, row: CatalogRow) {
        self.changes.push(RowChange::Update(row));
    }

    pub fn delete(&mut self, id: impl Into<String>) {
        self.changes.push(RowChange::Delete { id: id.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowChange> {
        self.changes.iter()
    }

    pub fn as_slice(&self) -> &[RowChange] {
        &self.changes
    }

    /// Ids of deleted rows, in write order
    pub fn deleted_ids(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter_map(|change| match change {
                RowChange::Delete { id } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

impl IntoIterator for ChangeSet {
    type Item = RowChange;
    type IntoIter = std::vec::IntoIter<RowChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}
