//! Read-only catalog statistics

use crate::models::NodeKind;
use crate::tree::Catalog;
use serde::{Deserialize, Serialize};

/// Node counts per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindCounts {
    pub service: usize,
    pub plan: usize,
    pub add_on: usize,
    pub sub_add_on: usize,
}

/// Summary of a catalog forest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total: usize,
    pub roots: usize,
    pub by_kind: KindCounts,
    pub optional: usize,
    pub recurring: usize,
    pub mutually_exclusive: usize,
    /// Deepest level in use, 0 for an empty catalog
    pub max_depth: u8,
}

impl CatalogStats {
    pub fn collect(catalog: &Catalog) -> Self {
        let mut stats = Self {
            roots: catalog.roots().len(),
            ..Self::default()
        };

        for node in catalog.nodes() {
            stats.total += 1;
            match node.kind() {
                Some(NodeKind::Service) => stats.by_kind.service += 1,
                Some(NodeKind::Plan) => stats.by_kind.plan += 1,
                Some(NodeKind::AddOn) => stats.by_kind.add_on += 1,
                Some(NodeKind::SubAddOn) => stats.by_kind.sub_add_on += 1,
                None => {}
            }
            stats.optional += usize::from(node.is_optional);
            stats.recurring += usize::from(node.is_recurring);
            stats.mutually_exclusive += usize::from(node.is_mutually_exclusive);
            stats.max_depth = stats.max_depth.max(node.level);
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewNode;

    #[test]
    fn test_stats_empty_catalog() {
        let stats = CatalogStats::collect(&Catalog::new());
        assert_eq!(stats, CatalogStats::default());
    }

    #[test]
    fn test_stats_counts_kinds_and_flags() {
        let mut catalog = Catalog::new();
        let (svc, _) = catalog
            .add_node(None, NewNode::named("Home Care"))
            .unwrap();
        let (plan, _) = catalog
            .add_node(Some(&svc.id), NewNode::named("Weekly").recurring(true))
            .unwrap();
        catalog
            .add_node(Some(&plan.id), NewNode::named("Meals").optional(true))
            .unwrap();
        catalog.add_node(None, NewNode::named("Transport")).unwrap();

        let stats = CatalogStats::collect(&catalog);

        assert_eq!(stats.total, 4);
        assert_eq!(stats.roots, 2);
        assert_eq!(stats.by_kind.service, 2);
        assert_eq!(stats.by_kind.plan, 1);
        assert_eq!(stats.by_kind.add_on, 1);
        assert_eq!(stats.recurring, 1);
        assert_eq!(stats.optional, 1);
        assert_eq!(stats.max_depth, 3);
    }
}
