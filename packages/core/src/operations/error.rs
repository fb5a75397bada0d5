//! Error types for catalog operations
//!
//! This module defines every error a catalog mutation, load or save can
//! surface. Structural errors (`CycleDetected`, `DepthExceeded`,
//! `SiblingSetMismatch`) are always raised before the forest is touched.

use std::fmt;
use thiserror::Error;

/// Which persistence step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceOperation {
    InsertRow,
    UpdateRow,
    DeleteRow,
    LoadCatalog,
    SaveCatalog,
}

impl fmt::Display for PersistenceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InsertRow => "insert_row",
            Self::UpdateRow => "update_row",
            Self::DeleteRow => "delete_row",
            Self::LoadCatalog => "load_catalog",
            Self::SaveCatalog => "save_catalog",
        };
        f.write_str(label)
    }
}

fn node_suffix(node_id: &Option<String>) -> String {
    match node_id {
        Some(id) => format!(" of node '{}'", id),
        None => String::new(),
    }
}

fn parent_label(parent_id: &Option<String>) -> String {
    match parent_id {
        Some(id) => format!("'{}'", id),
        None => "the root list".to_string(),
    }
}

/// Errors that can occur during catalog operations
///
/// # Examples
///
/// ```rust
/// use carecatalog_core::operations::CatalogError;
///
/// let err = CatalogError::depth_exceeded("addon-1", 5);
/// assert!(err.is_structural());
///
/// let err = CatalogError::node_not_found("missing");
/// assert_eq!(err.to_string(), "Node 'missing' does not exist");
/// ```
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Referenced node does not exist
    #[error("Node '{node_id}' does not exist")]
    NodeNotFound { node_id: String },

    /// Requested parent does not exist
    #[error("Parent node '{parent_id}' does not exist")]
    ParentNotFound { parent_id: String },

    /// Moving the node would make it its own ancestor
    #[error("Cycle detected: node '{node_id}' cannot be moved under '{new_parent_id}'")]
    CycleDetected {
        node_id: String,
        new_parent_id: String,
    },

    /// A node (or one of its descendants) would land deeper than the maximum level
    #[error("Depth exceeded: node '{node_id}' would reach level {level} (maximum {max})")]
    DepthExceeded {
        node_id: String,
        level: usize,
        max: u8,
    },

    /// Reorder list is not exactly a permutation of the current children
    #[error("Sibling set mismatch under {}: {reason}", parent_label(.parent_id))]
    SiblingSetMismatch {
        parent_id: Option<String>,
        reason: String,
    },

    /// A storage call failed; the in-memory catalog was not advanced
    #[error("Persistence failure during {operation}{}: {reason}", node_suffix(.node_id))]
    PersistenceFailure {
        operation: PersistenceOperation,
        node_id: Option<String>,
        reason: String,
    },

    /// The stored snapshot moved on since this session loaded it
    #[error("Version conflict: expected catalog version {expected_version}, found {actual_version}")]
    VersionConflict {
        expected_version: u64,
        actual_version: u64,
    },

    /// Stored data cannot be turned into a valid forest
    #[error("Corrupt catalog: {0}")]
    CorruptCatalog(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CatalogError {
    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    pub fn parent_not_found(parent_id: impl Into<String>) -> Self {
        Self::ParentNotFound {
            parent_id: parent_id.into(),
        }
    }

    pub fn cycle_detected(node_id: impl Into<String>, new_parent_id: impl Into<String>) -> Self {
        Self::CycleDetected {
            node_id: node_id.into(),
            new_parent_id: new_parent_id.into(),
        }
    }

    pub fn depth_exceeded(node_id: impl Into<String>, level: usize) -> Self {
        Self::DepthExceeded {
            node_id: node_id.into(),
            level,
            max: crate::models::MAX_LEVEL,
        }
    }

    pub fn sibling_set_mismatch(parent_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self::SiblingSetMismatch {
            parent_id: parent_id.map(str::to_string),
            reason: reason.into(),
        }
    }

    pub fn persistence_failure(
        operation: PersistenceOperation,
        node_id: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PersistenceFailure {
            operation,
            node_id: node_id.map(str::to_string),
            reason: reason.into(),
        }
    }

    pub fn version_conflict(expected_version: u64, actual_version: u64) -> Self {
        Self::VersionConflict {
            expected_version,
            actual_version,
        }
    }

    pub fn corrupt_catalog(msg: impl Into<String>) -> Self {
        Self::CorruptCatalog(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Errors detected by shape validation before any change is applied
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::CycleDetected { .. } | Self::DepthExceeded { .. } | Self::SiblingSetMismatch { .. }
        )
    }

    /// Errors that came from storage rather than from the tree rules
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::PersistenceFailure { .. } | Self::VersionConflict { .. }
        )
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_failure_names_row() {
        let err = CatalogError::persistence_failure(
            PersistenceOperation::DeleteRow,
            Some("addon-7"),
            "database is locked",
        );
        assert_eq!(
            err.to_string(),
            "Persistence failure during delete_row of node 'addon-7': database is locked"
        );
        assert!(err.is_persistence());
        assert!(!err.is_structural());
    }

    #[test]
    fn test_sibling_mismatch_message_for_roots() {
        let err = CatalogError::sibling_set_mismatch(None, "missing 's2'");
        assert_eq!(
            err.to_string(),
            "Sibling set mismatch under the root list: missing 's2'"
        );
    }
}
