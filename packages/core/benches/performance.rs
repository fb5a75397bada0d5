//! Performance benchmarks for CareCatalog core operations
//!
//! Run with: `cargo bench -p carecatalog-core`
//!
//! These benchmarks measure critical path performance:
//! - Forest rebuild from flat rows (catalog load)
//! - In-memory structural edits (clone, reparent)
//! - Immediate-mode writes (one transaction per operation)
//! - Draft snapshot saves (whole document, compare-and-swap)

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use carecatalog_core::db::{DatabaseService, TursoCatalogStore};
use carecatalog_core::services::{BatchedRepository, CatalogService, ImmediateRepository};
use carecatalog_core::tree::{flatten, materialize, Catalog, CloneMode};
use carecatalog_core::NewNode;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Build a three-level catalog with `width` children at every level
///
/// `width = 10` gives 1110 nodes.
fn build_catalog(width: usize) -> Catalog {
    let mut catalog = Catalog::new();
    for s in 0..width {
        let (service, _) = catalog
            .add_node(None, NewNode::named(format!("Service {}", s)))
            .unwrap();
        for p in 0..width {
            let (plan, _) = catalog
                .add_node(Some(&service.id), NewNode::named(format!("Plan {}.{}", s, p)))
                .unwrap();
            for a in 0..width {
                catalog
                    .add_node(
                        Some(&plan.id),
                        NewNode::named(format!("Add-on {}.{}.{}", s, p, a)).optional(true),
                    )
                    .unwrap();
            }
        }
    }
    catalog
}

/// Setup a store on a fresh database
async fn setup_test_store() -> (Arc<TursoCatalogStore>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bench.db");

    let db = Arc::new(DatabaseService::new(db_path).await.unwrap());
    (Arc::new(TursoCatalogStore::new(db)), temp_dir)
}

/// Benchmark rebuilding the forest from flat rows
///
/// This is the load path for flat-mode catalogs.
fn bench_materialize(c: &mut Criterion) {
    let rows = flatten(&build_catalog(10));

    c.bench_function("materialize_1110_rows", |b| {
        b.iter(|| black_box(materialize(rows.clone()).unwrap()));
    });
}

/// Benchmark in-memory structural edits on a 1110-node catalog
fn bench_tree_mutations(c: &mut Criterion) {
    let catalog = build_catalog(10);
    let first_service = catalog.roots()[0].id.clone();
    let last_service = catalog.roots()[9].id.clone();
    let plan = catalog.roots()[0].children[0].id.clone();

    let mut group = c.benchmark_group("tree_mutations");

    group.bench_function("deep_clone_service", |b| {
        b.iter(|| {
            let mut working = catalog.clone();
            black_box(working.clone_node(&first_service, CloneMode::Deep).unwrap())
        });
    });

    group.bench_function("reparent_plan", |b| {
        b.iter(|| {
            let mut working = catalog.clone();
            black_box(working.reparent_node(&plan, Some(&last_service)).unwrap())
        });
    });

    group.finish();
}

/// Benchmark immediate-mode add_node
///
/// Each iteration is one full transaction against libsql.
/// Target: < 15ms per operation
fn bench_immediate_add(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("immediate_add_node", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (store, _temp) = setup_test_store().await;
                let repository = Arc::new(ImmediateRepository::new(store));
                let mut session = CatalogService::open(repository).await.unwrap();
                let service = session
                    .add_node(None, NewNode::named("Parent"))
                    .await
                    .unwrap();

                let start = std::time::Instant::now();
                for i in 0..iters {
                    black_box(
                        session
                            .add_node(Some(&service.id), NewNode::named(format!("Plan {}", i)))
                            .await
                            .unwrap(),
                    );
                }
                start.elapsed()
            })
        });
    });
}

/// Benchmark saving a 1110-node draft as one snapshot
fn bench_draft_save(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("draft_save");
    group.sample_size(10); // Fewer samples for expensive operations

    group.bench_function("1110_nodes", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (store, _temp) = setup_test_store().await;
                let repository = Arc::new(BatchedRepository::new(store));
                let mut session = CatalogService::open(repository).await.unwrap();
                for s in 0..10 {
                    let service = session
                        .add_node(None, NewNode::named(format!("Service {}", s)))
                        .await
                        .unwrap();
                    for p in 0..10 {
                        let plan = session
                            .add_node(Some(&service.id), NewNode::named(format!("Plan {}", p)))
                            .await
                            .unwrap();
                        for a in 0..10 {
                            session
                                .add_node(Some(&plan.id), NewNode::named(format!("Add-on {}", a)))
                                .await
                                .unwrap();
                        }
                    }
                }

                let mut total = std::time::Duration::ZERO;
                for i in 0..iters {
                    // Keep the session dirty so every save writes
                    session
                        .add_node(None, NewNode::named(format!("Extra {}", i)))
                        .await
                        .unwrap();

                    let start = std::time::Instant::now();
                    black_box(session.save().await.unwrap());
                    total += start.elapsed();
                }
                total
            })
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_materialize,
    bench_tree_mutations,
    bench_immediate_add,
    bench_draft_save
);
criterion_main!(benches);
