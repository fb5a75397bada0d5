//! Catalog Node Data Structures
//!
//! This module defines the `CatalogNode` struct and the related value types used by
//! the catalog tree engine.
//!
//! # Architecture
//!
//! - **Tree view**: `CatalogNode` owns its `children` for traversal and rendering
//! - **Flat view**: `CatalogRow` is the parent-pointer shape stored in `catalog_nodes`
//! - **Derived level**: `level` always follows from the parent chain (1..=4)
//! - **Typed patches**: `NodePatch` replaces free-form JSON updates and rejects unknown fields
//!
//! # Examples
//!
//! ```rust
//! use carecatalog_core::models::{NewNode, NodePatch};
//! use bigdecimal::BigDecimal;
//!
//! let consult = NewNode::named("Telehealth Consult")
//!     .with_price("49.90".parse::<BigDecimal>().unwrap())
//!     .recurring(true);
//!
//! let patch = NodePatch::new().with_name("Video Consult".to_string());
//! assert!(!patch.is_empty());
//! ```

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Deepest level a catalog node may occupy (service → plan → add-on → sub-add-on)
pub const MAX_LEVEL: u8 = 4;

/// Label for a node derived from its level.
///
/// The catalog itself does not store a kind; it is always a function of depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Service,
    Plan,
    AddOn,
    SubAddOn,
}

impl NodeKind {
    /// Map a level (1-indexed) to its kind, `None` outside 1..=4
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Service),
            2 => Some(Self::Plan),
            3 => Some(Self::AddOn),
            4 => Some(Self::SubAddOn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Plan => "plan",
            Self::AddOn => "add_on",
            Self::SubAddOn => "sub_add_on",
        }
    }
}

/// One entry of the catalog in its tree form.
///
/// # Fields
///
/// - `id`: Unique across the whole catalog (UUID v4 for engine-created nodes)
/// - `parent_id`: Parent reference, `None` for a root service
/// - `level`: Depth from the root, 1-indexed; derived, never set directly by callers
/// - `sort_order`: Position among siblings (ascending)
/// - `children`: Derived view rebuilt from `parent_id` back-references
///
/// The authoritative relationship is `parent_id`. `children` exists so that the
/// forest can be traversed and serialized as a nested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogNode {
    pub id: String,

    pub parent_id: Option<String>,

    pub level: u8,

    pub sort_order: i64,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub is_optional: bool,

    #[serde(default)]
    pub is_recurring: bool,

    #[serde(default)]
    pub is_mutually_exclusive: bool,

    #[serde(default)]
    pub base_price: BigDecimal,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub children: Vec<CatalogNode>,
}

impl CatalogNode {
    /// Build a node from caller-supplied data at a known tree position
    ///
    /// Position fields (`parent_id`, `level`, `sort_order`) are decided by the
    /// mutator, never by the caller.
    pub fn from_new(
        id: String,
        parent_id: Option<String>,
        level: u8,
        sort_order: i64,
        data: NewNode,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            parent_id,
            level,
            sort_order,
            name: data.name,
            description: data.description,
            is_optional: data.is_optional,
            is_recurring: data.is_recurring,
            is_mutually_exclusive: data.is_mutually_exclusive,
            base_price: data.base_price,
            created_at: now,
            updated_at: now,
            children: Vec::new(),
        }
    }

    /// Build a childless node from a stored row
    pub fn from_row(row: CatalogRow) -> Self {
        Self {
            id: row.id,
            parent_id: row.parent_id,
            level: row.level,
            sort_order: row.sort_order,
            name: row.name,
            description: row.description,
            is_optional: row.is_optional,
            is_recurring: row.is_recurring,
            is_mutually_exclusive: row.is_mutually_exclusive,
            base_price: row.base_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
            children: Vec::new(),
        }
    }

    /// Flat row for this node alone (children are not included)
    pub fn to_row(&self) -> CatalogRow {
        CatalogRow {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            level: self.level,
            sort_order: self.sort_order,
            name: self.name.clone(),
            description: self.description.clone(),
            is_optional: self.is_optional,
            is_recurring: self.is_recurring,
            is_mutually_exclusive: self.is_mutually_exclusive,
            base_price: self.base_price.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Copy of this node without its children
    pub fn detached(&self) -> Self {
        Self::from_row(self.to_row())
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::from_level(self.level)
    }

    /// Visit this node and every descendant in pre-order
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a CatalogNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Ids of this node and all its descendants, pre-order
    pub fn subtree_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.walk(&mut |node| ids.push(node.id.clone()));
        ids
    }

    /// Number of nodes in the subtree rooted here (including this node)
    pub fn subtree_len(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(CatalogNode::subtree_len)
            .sum::<usize>()
    }

    /// Apply a field patch in place and refresh `updated_at`
    ///
    /// Structural fields are not part of `NodePatch`, so an edit can never move
    /// the node or change its depth.
    pub fn apply_patch(&mut self, patch: NodePatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(is_optional) = patch.is_optional {
            self.is_optional = is_optional;
        }
        if let Some(is_recurring) = patch.is_recurring {
            self.is_recurring = is_recurring;
        }
        if let Some(is_mutually_exclusive) = patch.is_mutually_exclusive {
            self.is_mutually_exclusive = is_mutually_exclusive;
        }
        if let Some(base_price) = patch.base_price {
            self.base_price = base_price;
        }
        self.updated_at = Utc::now();
    }
}

/// Flat, parent-pointer shape of a catalog node as stored in `catalog_nodes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRow {
    pub id: String,
    pub parent_id: Option<String>,
    pub level: u8,
    pub sort_order: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_optional: bool,
    pub is_recurring: bool,
    pub is_mutually_exclusive: bool,
    pub base_price: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied data for a new node
///
/// Defaults: zero price, all flags off, no description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewNode {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub is_optional: bool,

    #[serde(default)]
    pub is_recurring: bool,

    #[serde(default)]
    pub is_mutually_exclusive: bool,

    #[serde(default)]
    pub base_price: BigDecimal,
}

impl NewNode {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_price(mut self, base_price: BigDecimal) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn optional(mut self, is_optional: bool) -> Self {
        self.is_optional = is_optional;
        self
    }

    pub fn recurring(mut self, is_recurring: bool) -> Self {
        self.is_recurring = is_recurring;
        self
    }

    pub fn mutually_exclusive(mut self, is_mutually_exclusive: bool) -> Self {
        self.is_mutually_exclusive = is_mutually_exclusive;
        self
    }
}

/// Custom deserializer for optional fields that accepts both plain values and null
///
/// Maps three input formats to the double-Option pattern:
/// - Missing field → None (don't update)
/// - null → Some(None) (clear the value)
/// - "value" → Some(Some("value")) (set to value)
fn deserialize_optional_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Field-level patch for `update_node`
///
/// Only the provided fields change. `parent_id`, `level`, `sort_order` and
/// `children` are not patchable: shape changes go through reparent,
/// reorder and delete. Unknown fields are rejected when deserializing.
///
/// # Double-Option Pattern
///
/// `description` distinguishes three states:
///
/// - `None`: Don't change the description
/// - `Some(None)`: Clear the description
/// - `Some(Some(text))`: Set the description
///
/// # Examples
///
/// ```rust
/// # use carecatalog_core::models::NodePatch;
/// let patch: NodePatch = serde_json::from_str(r#"{"description": null}"#).unwrap();
/// assert_eq!(patch.description, Some(None));
///
/// let rejected = serde_json::from_str::<NodePatch>(r#"{"parentId": "x"}"#);
/// assert!(rejected.is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub description: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_optional: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_recurring: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_mutually_exclusive: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_price: Option<BigDecimal>,
}

impl NodePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_optional(mut self, is_optional: bool) -> Self {
        self.is_optional = Some(is_optional);
        self
    }

    pub fn with_recurring(mut self, is_recurring: bool) -> Self {
        self.is_recurring = Some(is_recurring);
        self
    }

    pub fn with_mutually_exclusive(mut self, is_mutually_exclusive: bool) -> Self {
        self.is_mutually_exclusive = Some(is_mutually_exclusive);
        self
    }

    pub fn with_base_price(mut self, base_price: BigDecimal) -> Self {
        self.base_price = Some(base_price);
        self
    }

    /// Check if the patch contains any changes
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.is_optional.is_none()
            && self.is_recurring.is_none()
            && self.is_mutually_exclusive.is_none()
            && self.base_price.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_node_kind_from_level() {
        assert_eq!(NodeKind::from_level(1), Some(NodeKind::Service));
        assert_eq!(NodeKind::from_level(4), Some(NodeKind::SubAddOn));
        assert_eq!(NodeKind::from_level(0), None);
        assert_eq!(NodeKind::from_level(5), None);
    }

    #[test]
    fn test_patch_leaves_structure_alone() {
        let mut node = CatalogNode::from_new(
            "n1".to_string(),
            Some("p1".to_string()),
            2,
            3,
            NewNode::named("Plan").with_description("old"),
        );
        let before = node.updated_at;

        node.apply_patch(
            NodePatch::new()
                .with_name("Premium Plan".to_string())
                .with_description(None)
                .with_base_price(BigDecimal::from_str("120.50").unwrap()),
        );

        assert_eq!(node.name, "Premium Plan");
        assert_eq!(node.description, None);
        assert_eq!(node.base_price, BigDecimal::from_str("120.5").unwrap());
        assert_eq!(node.parent_id.as_deref(), Some("p1"));
        assert_eq!(node.level, 2);
        assert_eq!(node.sort_order, 3);
        assert!(node.updated_at >= before);
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let err = serde_json::from_str::<NodePatch>(r#"{"name": "x", "level": 3}"#);
        assert!(err.is_err(), "structural fields must not be patchable");

        let patch: NodePatch =
            serde_json::from_str(r#"{"isRecurring": true, "basePrice": "15.00"}"#).unwrap();
        assert_eq!(patch.is_recurring, Some(true));
        assert_eq!(patch.base_price, Some(BigDecimal::from_str("15").unwrap()));
        assert_eq!(patch.description, None);
    }

    #[test]
    fn test_row_conversion_keeps_fields() {
        let node = CatalogNode::from_new(
            "n1".to_string(),
            None,
            1,
            0,
            NewNode::named("Primary Care").optional(true).mutually_exclusive(true),
        );
        let back = CatalogNode::from_row(node.to_row());
        assert_eq!(back, node);
    }
}
