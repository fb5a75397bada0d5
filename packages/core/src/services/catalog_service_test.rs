//! Session tests against a scripted repository
//!
//! The repository here keeps nothing on disk; it records what it was asked to
//! do and can be told to fail or stall, which is what the commit protocol
//! needs to be checked against.

use super::*;
use crate::models::NewNode;
use crate::services::repository::LoadedCatalog;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

struct ScriptedRepository {
    mode: PersistenceMode,
    fail_writes: AtomicBool,
    stall: Mutex<Option<Duration>>,
    recorded: AtomicUsize,
    stored_version: AtomicU64,
}

impl ScriptedRepository {
    fn new(mode: PersistenceMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            fail_writes: AtomicBool::new(false),
            stall: Mutex::new(None),
            recorded: AtomicUsize::new(0),
            stored_version: AtomicU64::new(0),
        })
    }

    fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn stall_for(&self, duration: Duration) {
        *self.stall.lock().unwrap() = Some(duration);
    }

    async fn maybe_stall(&self) {
        let stall = *self.stall.lock().unwrap();
        if let Some(duration) = stall {
            tokio::time::sleep(duration).await;
        }
    }
}

#[async_trait]
impl CatalogRepository for ScriptedRepository {
    fn mode(&self) -> PersistenceMode {
        self.mode
    }

    async fn load_catalog(&self) -> Result<LoadedCatalog, CatalogError> {
        Ok(LoadedCatalog {
            catalog: Catalog::new(),
            version: self.stored_version.load(Ordering::SeqCst),
            saved_at: None,
        })
    }

    async fn record_changes(&self, changes: &ChangeSet) -> Result<(), CatalogError> {
        self.maybe_stall().await;
        if self.mode == PersistenceMode::Draft {
            return Ok(());
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            let first = changes.iter().next().unwrap();
            return Err(CatalogError::persistence_failure(
                first.operation(),
                Some(first.node_id()),
                "disk full",
            ));
        }
        self.recorded.fetch_add(changes.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn save_catalog(
        &self,
        _catalog: &Catalog,
        expected_version: u64,
    ) -> Result<u64, CatalogError> {
        self.maybe_stall().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CatalogError::persistence_failure(
                PersistenceOperation::SaveCatalog,
                None,
                "disk full",
            ));
        }
        let actual = self.stored_version.load(Ordering::SeqCst);
        if actual != expected_version {
            return Err(CatalogError::version_conflict(expected_version, actual));
        }
        self.stored_version.store(actual + 1, Ordering::SeqCst);
        Ok(actual + 1)
    }
}

async fn open(repository: &Arc<ScriptedRepository>) -> CatalogService {
    CatalogService::open(repository.clone()).await.unwrap()
}

#[tokio::test]
async fn test_immediate_mutations_reach_repository() {
    let repository = ScriptedRepository::new(PersistenceMode::Immediate);
    let mut session = open(&repository).await;

    let svc = session
        .add_node(None, NewNode::named("Physiotherapy"))
        .await
        .unwrap();
    session
        .add_node(Some(&svc.id), NewNode::named("Ten Sessions"))
        .await
        .unwrap();

    assert_eq!(repository.recorded.load(Ordering::SeqCst), 2);
    assert_eq!(session.catalog().len(), 2);
    assert!(!session.is_dirty());
}

#[tokio::test]
async fn test_failed_write_leaves_session_unchanged() {
    let repository = ScriptedRepository::new(PersistenceMode::Immediate);
    let mut session = open(&repository).await;
    let svc = session
        .add_node(None, NewNode::named("Dental"))
        .await
        .unwrap();
    let before = session.catalog().clone();
    let mut events = session.subscribe_to_events();

    repository.fail_writes(true);
    let err = session.remove_node(&svc.id).await.unwrap_err();

    match err {
        CatalogError::PersistenceFailure {
            operation, node_id, ..
        } => {
            assert_eq!(operation, PersistenceOperation::DeleteRow);
            assert_eq!(node_id.as_deref(), Some(svc.id.as_str()));
        }
        other => panic!("Expected PersistenceFailure, got {:?}", other),
    }
    assert_eq!(session.catalog(), &before);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_structural_error_skips_repository() {
    let repository = ScriptedRepository::new(PersistenceMode::Immediate);
    let mut session = open(&repository).await;

    let err = session
        .add_node(Some("missing"), NewNode::named("x"))
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::ParentNotFound { .. }));
    assert_eq!(repository.recorded.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_events_follow_successful_mutations() {
    let repository = ScriptedRepository::new(PersistenceMode::Immediate);
    let mut session = open(&repository).await;
    let mut events = session.subscribe_to_events();

    let s1 = session.add_node(None, NewNode::named("S1")).await.unwrap();
    let s2 = session.add_node(None, NewNode::named("S2")).await.unwrap();
    let plan = session
        .add_node(Some(&s1.id), NewNode::named("Plan"))
        .await
        .unwrap();
    session.reparent_node(&plan.id, Some(&s2.id)).await.unwrap();
    session.remove_node(&s1.id).await.unwrap();

    let types: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| event.event_type().to_string())
        .collect();
    assert_eq!(
        types,
        vec![
            "node:added",
            "node:added",
            "node:added",
            "node:moved",
            "subtree:removed"
        ]
    );
}

#[tokio::test]
async fn test_draft_save_clears_dirty() {
    let repository = ScriptedRepository::new(PersistenceMode::Draft);
    let mut session = open(&repository).await;
    assert!(!session.is_dirty());

    session.add_node(None, NewNode::named("Vision")).await.unwrap();
    assert!(session.is_dirty());
    assert!(session.last_saved_at().is_none());

    let version = session.save().await.unwrap();

    assert_eq!(version, 1);
    assert_eq!(session.version(), 1);
    assert!(!session.is_dirty());
    assert!(session.last_saved_at().is_some());
}

#[tokio::test]
async fn test_failed_save_keeps_dirty() {
    let repository = ScriptedRepository::new(PersistenceMode::Draft);
    let mut session = open(&repository).await;
    session.add_node(None, NewNode::named("Vision")).await.unwrap();

    repository.fail_writes(true);
    let err = session.save().await.unwrap_err();

    assert!(err.is_persistence());
    assert!(session.is_dirty());
    assert_eq!(session.catalog().len(), 1);
    assert_eq!(session.version(), 0);
}

#[tokio::test]
async fn test_save_timeout_reports_failure() {
    let repository = ScriptedRepository::new(PersistenceMode::Draft);
    let mut session =
        CatalogService::open_with(repository.clone(), CloneMode::Shallow, Duration::from_millis(20))
            .await
            .unwrap();
    session.add_node(None, NewNode::named("Vision")).await.unwrap();

    repository.stall_for(Duration::from_secs(1));
    let err = session.save().await.unwrap_err();

    assert!(matches!(
        err,
        CatalogError::PersistenceFailure {
            operation: PersistenceOperation::SaveCatalog,
            ..
        }
    ));
    assert!(session.is_dirty());
}

#[tokio::test]
async fn test_concurrent_save_is_a_version_conflict() {
    let repository = ScriptedRepository::new(PersistenceMode::Draft);
    let mut first = open(&repository).await;
    let mut second = open(&repository).await;

    first.add_node(None, NewNode::named("A")).await.unwrap();
    second.add_node(None, NewNode::named("B")).await.unwrap();

    first.save().await.unwrap();
    let err = second.save().await.unwrap_err();

    assert!(matches!(
        err,
        CatalogError::VersionConflict {
            expected_version: 0,
            actual_version: 1
        }
    ));
    assert!(second.is_dirty());
}

#[tokio::test]
async fn test_clean_session_save_is_noop() {
    let repository = ScriptedRepository::new(PersistenceMode::Draft);
    let mut session = open(&repository).await;

    assert_eq!(session.save().await.unwrap(), 0);
    assert_eq!(repository.stored_version.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_clone_uses_session_mode() {
    let repository = ScriptedRepository::new(PersistenceMode::Immediate);
    let mut session =
        CatalogService::open_with(repository.clone(), CloneMode::Deep, DEFAULT_SAVE_TIMEOUT)
            .await
            .unwrap();
    let svc = session.add_node(None, NewNode::named("Rehab")).await.unwrap();
    session
        .add_node(Some(&svc.id), NewNode::named("Program"))
        .await
        .unwrap();

    let copy = session.clone_node(&svc.id).await.unwrap();

    assert_eq!(copy.name, "Rehab (Copy)");
    assert_eq!(copy.children.len(), 1);
    assert_eq!(session.stats().total, 4);
}
