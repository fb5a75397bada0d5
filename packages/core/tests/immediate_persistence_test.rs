//! Flat-Mode Persistence Tests
//!
//! Runs editing sessions against a real libsql database in immediate-write
//! mode: every operation must land in `catalog_nodes` as it happens, reopen
//! to the same forest, and leave both memory and disk untouched when a row
//! write fails.

#[cfg(test)]
mod immediate_persistence_tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use carecatalog_core::db::{
        CatalogStore, DatabaseError, DatabaseService, SnapshotWrite, StoredSnapshot,
        TursoCatalogStore,
    };
    use carecatalog_core::models::{CatalogRow, NewNode, NodePatch};
    use carecatalog_core::operations::{CatalogError, ChangeSet, PersistenceOperation};
    use carecatalog_core::services::{CatalogService, ImmediateRepository};
    use carecatalog_core::tree::flatten;
    use std::str::FromStr;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Helper to create a store on a fresh temp database
    async fn create_test_store() -> Result<(Arc<TursoCatalogStore>, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = Arc::new(DatabaseService::new(temp_dir.path().join("catalog.db")).await?);
        Ok((Arc::new(TursoCatalogStore::new(db)), temp_dir))
    }

    async fn open_session(store: Arc<dyn CatalogStore>) -> Result<CatalogService> {
        let repository = Arc::new(ImmediateRepository::new(store));
        Ok(CatalogService::open(repository).await?)
    }

    #[tokio::test]
    async fn test_scenario_roots_get_consecutive_sort_orders() -> Result<()> {
        let (store, _temp_dir) = create_test_store().await?;
        let mut session = open_session(store.clone()).await?;

        let plan = session.add_node(None, NewNode::named("Plan")).await?;
        let plan2 = session.add_node(None, NewNode::named("Plan2")).await?;

        assert_eq!((plan.level, plan.sort_order), (1, 0));
        assert_eq!((plan2.level, plan2.sort_order), (1, 1));
        assert_eq!(store.load_rows().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_scenario_cascade_delete_reaches_disk() -> Result<()> {
        let (store, _temp_dir) = create_test_store().await?;
        let mut session = open_session(store.clone()).await?;

        let s1 = session.add_node(None, NewNode::named("S1")).await?;
        let addon = session
            .add_node(Some(&s1.id), NewNode::named("Addon"))
            .await?;
        assert_eq!(addon.level, 2);

        let result = session.remove_node(&s1.id).await?;

        assert!(result.existed);
        assert_eq!(result.removed_ids, vec![s1.id.clone(), addon.id.clone()]);
        assert!(store.load_rows().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_scenario_reparent_and_depth_limit() -> Result<()> {
        let (store, _temp_dir) = create_test_store().await?;
        let mut session = open_session(store.clone()).await?;

        let s1 = session.add_node(None, NewNode::named("S1")).await?;
        let s2 = session.add_node(None, NewNode::named("S2")).await?;
        let addon = session
            .add_node(Some(&s1.id), NewNode::named("Addon"))
            .await?;
        let child = session
            .add_node(Some(&addon.id), NewNode::named("Addon child"))
            .await?;

        let moved = session.reparent_node(&addon.id, Some(&s2.id)).await?;
        assert_eq!(moved.level, 2);
        assert_eq!(session.node(&child.id).map(|n| n.level), Some(3));

        // Build S2 > P > A > X, then try to push the Addon subtree under A
        let p = session.add_node(Some(&s2.id), NewNode::named("P")).await?;
        let a = session.add_node(Some(&p.id), NewNode::named("A")).await?;
        let before = session.catalog().clone();
        let err = session
            .reparent_node(&addon.id, Some(&a.id))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::DepthExceeded { level: 5, .. }));
        assert_eq!(session.catalog(), &before);

        // The stored rows agree with memory
        let reopened = open_session(store).await?;
        assert_eq!(reopened.catalog(), session.catalog());
        Ok(())
    }

    #[tokio::test]
    async fn test_reopen_reproduces_forest_after_mixed_edits() -> Result<()> {
        let (store, _temp_dir) = create_test_store().await?;
        let mut session = open_session(store.clone()).await?;

        let home = session.add_node(None, NewNode::named("Home Care")).await?;
        let lab = session.add_node(None, NewNode::named("Lab Tests")).await?;
        let weekly = session
            .add_node(
                Some(&home.id),
                NewNode::named("Weekly Visit")
                    .with_price(BigDecimal::from_str("89.95")?)
                    .recurring(true),
            )
            .await?;
        session
            .add_node(Some(&weekly.id), NewNode::named("Meals").optional(true))
            .await?;
        session
            .update_node(
                &lab.id,
                NodePatch::new().with_description(Some("Blood panels".to_string())),
            )
            .await?;
        session.clone_node(&home.id).await?;
        let order: Vec<String> = session
            .catalog()
            .roots()
            .iter()
            .rev()
            .map(|n| n.id.clone())
            .collect();
        session.reorder_siblings(None, &order).await?;

        let reopened = open_session(store.clone()).await?;

        assert_eq!(reopened.catalog(), session.catalog());
        assert_eq!(reopened.stats(), session.stats());
        assert_eq!(flatten(reopened.catalog()).len(), store.load_rows().await?.len());
        Ok(())
    }

    #[tokio::test]
    async fn test_orphan_rows_load_as_roots() -> Result<()> {
        let (store, _temp_dir) = create_test_store().await?;
        let mut session = open_session(store.clone()).await?;
        let svc = session.add_node(None, NewNode::named("Dental")).await?;
        let lab = session.add_node(None, NewNode::named("Lab")).await?;
        let cleaning = session
            .add_node(Some(&svc.id), NewNode::named("Cleaning"))
            .await?;
        let panel = session
            .add_node(Some(&svc.id), NewNode::named("Panel"))
            .await?;

        // Drop the parent row behind the engine's back
        assert!(store.delete_row(&svc.id).await?);

        let mut reopened = open_session(store.clone()).await?;
        let orphan = reopened.node(&cleaning.id).unwrap();
        assert!(orphan.is_root());
        assert_eq!(orphan.level, 1);
        reopened.catalog().validate()?;

        let roots: Vec<(&str, i64)> = reopened
            .catalog()
            .roots()
            .iter()
            .map(|r| (r.id.as_str(), r.sort_order))
            .collect();
        assert_eq!(
            roots,
            vec![
                (cleaning.id.as_str(), 0),
                (lab.id.as_str(), 1),
                (panel.id.as_str(), 2)
            ]
        );

        // Repairs were written back to the rows
        let rows = store.load_rows().await?;
        let stored_panel = rows.iter().find(|r| r.id == panel.id).unwrap();
        assert_eq!(stored_panel.parent_id, None);
        assert_eq!((stored_panel.level, stored_panel.sort_order), (1, 2));
        assert!(rows.iter().all(|r| r.parent_id.is_none() && r.level == 1));

        let again = open_session(store.clone()).await?;
        assert_eq!(again.catalog(), reopened.catalog());

        // Cloning next to a repaired sibling keeps orders distinct on disk
        let copy = reopened.clone_node(&cleaning.id).await?;
        assert_eq!(copy.sort_order, 1);
        reopened.catalog().validate()?;
        let after_clone = open_session(store).await?;
        assert_eq!(after_clone.catalog(), reopened.catalog());
        Ok(())
    }

    /// Store wrapper that fails the first write touching a chosen node
    struct FlakyStore {
        inner: Arc<TursoCatalogStore>,
        fail_on: Mutex<Option<String>>,
    }

    #[async_trait]
    impl CatalogStore for FlakyStore {
        async fn load_rows(&self) -> Result<Vec<CatalogRow>> {
            self.inner.load_rows().await
        }

        async fn insert_row(&self, row: &CatalogRow) -> Result<()> {
            self.inner.insert_row(row).await
        }

        async fn update_row(&self, row: &CatalogRow) -> Result<()> {
            self.inner.update_row(row).await
        }

        async fn delete_row(&self, id: &str) -> Result<bool> {
            self.inner.delete_row(id).await
        }

        async fn apply_changes(&self, changes: &ChangeSet) -> Result<()> {
            let fail_on = self.fail_on.lock().unwrap().clone();
            if let Some(target) = fail_on {
                if let Some(change) = changes.iter().find(|c| c.node_id() == target) {
                    return Err(DatabaseError::row_write_failed(
                        change.operation(),
                        target,
                        "database is locked",
                    )
                    .into());
                }
            }
            self.inner.apply_changes(changes).await
        }

        async fn load_snapshot(&self, snapshot_id: &str) -> Result<Option<StoredSnapshot>> {
            self.inner.load_snapshot(snapshot_id).await
        }

        async fn save_snapshot(
            &self,
            snapshot_id: &str,
            expected_version: u64,
            document: &str,
        ) -> Result<SnapshotWrite> {
            self.inner
                .save_snapshot(snapshot_id, expected_version, document)
                .await
        }

        async fn close(&self) -> Result<()> {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn test_failed_row_write_names_row_and_changes_nothing() -> Result<()> {
        let (inner, _temp_dir) = create_test_store().await?;
        let flaky = Arc::new(FlakyStore {
            inner: inner.clone(),
            fail_on: Mutex::new(None),
        });
        let mut session = open_session(flaky.clone()).await?;

        let s1 = session.add_node(None, NewNode::named("S1")).await?;
        let s2 = session.add_node(None, NewNode::named("S2")).await?;
        let s3 = session.add_node(None, NewNode::named("S3")).await?;
        let before_memory = session.catalog().clone();
        let before_disk = inner.load_rows().await?;

        *flaky.fail_on.lock().unwrap() = Some(s1.id.clone());
        let order = vec![s3.id.clone(), s2.id.clone(), s1.id.clone()];
        let err = session.reorder_siblings(None, &order).await.unwrap_err();

        match err {
            CatalogError::PersistenceFailure {
                operation, node_id, ..
            } => {
                assert_eq!(operation, PersistenceOperation::UpdateRow);
                assert_eq!(node_id.as_deref(), Some(s1.id.as_str()));
            }
            other => panic!("Expected PersistenceFailure, got {:?}", other),
        }
        assert_eq!(session.catalog(), &before_memory);

        let mut after_disk = inner.load_rows().await?;
        let mut before_disk = before_disk;
        after_disk.sort_by(|a, b| a.id.cmp(&b.id));
        before_disk.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(after_disk, before_disk);
        Ok(())
    }
}
