//! Catalog Domain Events
//!
//! Events emitted by the catalog editing session after a change has been
//! accepted by the repository. Subscribers (a UI bridge, an audit writer)
//! receive them through a tokio broadcast channel and never see changes that
//! failed to persist.
//!
//! # Event Flow
//!
//! 1. `CatalogService` runs a mutation on a working copy of the forest
//! 2. The repository records (or stages) the resulting row changes
//! 3. The working copy is committed and one event is broadcast

use crate::models::CatalogNode;
use serde::{Deserialize, Serialize};

/// Domain events emitted by `CatalogService`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CatalogEvent {
    /// A node was added (or created as a clone)
    NodeAdded { node: CatalogNode },

    /// A node's fields were edited
    NodeUpdated { node: CatalogNode },

    /// A node and its descendants were removed, ids in pre-order
    #[serde(rename_all = "camelCase")]
    SubtreeRemoved { removed_ids: Vec<String> },

    /// A node moved under a new parent (or to the root list)
    #[serde(rename_all = "camelCase")]
    NodeMoved {
        node_id: String,
        new_parent_id: Option<String>,
        level: u8,
    },

    /// A sibling list was put in a new order
    #[serde(rename_all = "camelCase")]
    SiblingsReordered {
        parent_id: Option<String>,
        ordered_ids: Vec<String>,
    },

    /// The whole catalog was saved as one snapshot
    CatalogSaved { version: u64 },
}

impl CatalogEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            CatalogEvent::NodeAdded { .. } => "node:added",
            CatalogEvent::NodeUpdated { .. } => "node:updated",
            CatalogEvent::SubtreeRemoved { .. } => "subtree:removed",
            CatalogEvent::NodeMoved { .. } => "node:moved",
            CatalogEvent::SiblingsReordered { .. } => "siblings:reordered",
            CatalogEvent::CatalogSaved { .. } => "catalog:saved",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The JSON shape is internally tagged: `type` sits next to the fields
    #[test]
    fn test_event_serialization_contract() {
        let event = CatalogEvent::NodeMoved {
            node_id: "addon-1".to_string(),
            new_parent_id: None,
            level: 1,
        };

        let parsed: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(parsed.get("type").unwrap(), "nodeMoved");
        assert_eq!(parsed.get("nodeId").unwrap(), "addon-1");
        assert!(parsed.get("newParentId").unwrap().is_null());
        assert_eq!(parsed.get("level").unwrap(), 1);
        assert_eq!(event.event_type(), "node:moved");
    }

    #[test]
    fn test_saved_event_round_trip() {
        let json = r#"{"type":"catalogSaved","version":7}"#;
        let event: CatalogEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, CatalogEvent::CatalogSaved { version: 7 }));
    }
}
