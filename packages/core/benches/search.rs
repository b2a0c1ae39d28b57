//! Performance benchmarks for taxonomy search
//!
//! Run with: `cargo bench -p mise-taxonomy`
//!
//! These benchmarks measure the live-typing path:
//! - Prefix search over a 10k-node taxonomy (short and long prefixes)
//! - Full index rebuild from the store
//! - Incremental index update for a single rename

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mise_taxonomy::db::TaxonomyEvent;
use mise_taxonomy::import::{FeedRecord, ImportPipeline};
use mise_taxonomy::{SearchIndex, TaxonomyConfig, TaxonomyStore};
use std::sync::Arc;
use tokio::runtime::Runtime;

const CATEGORIES: usize = 100;
const PER_CATEGORY: usize = 100;

/// Generate a two-level taxonomy: categories with ingredients below them
fn generate_records() -> Vec<FeedRecord> {
    let mut records = Vec::with_capacity(CATEGORIES * (PER_CATEGORY + 1));
    for c in 0..CATEGORIES {
        let category = format!("category-{}", c);
        records.push(FeedRecord::new(
            category.clone(),
            [("en", format!("Category {}", c)), ("fr", format!("Catégorie {}", c))],
        ));
        for i in 0..PER_CATEGORY {
            records.push(
                FeedRecord::new(
                    format!("ingredient-{}-{}", c, i),
                    [
                        ("en", format!("Tomato variety {} {}", c, i)),
                        ("fr", format!("Tomate variété {} {}", c, i)),
                    ],
                )
                .with_parent(category.clone()),
            );
        }
    }
    records
}

/// Setup a populated store and index
async fn setup() -> (Arc<TaxonomyStore>, SearchIndex) {
    let config = TaxonomyConfig::default();
    let store = Arc::new(TaxonomyStore::new());
    ImportPipeline::new(&config)
        .run_records(&store, "bench", generate_records())
        .await
        .unwrap();
    let index = SearchIndex::new(&config);
    index.rebuild(&store).await;
    (store, index)
}

fn bench_prefix_search(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (_store, index) = rt.block_on(setup());

    c.bench_function("search_short_prefix_first_page", |b| {
        b.iter(|| rt.block_on(async { black_box(index.search("to", "en", 50, 0).await) }))
    });

    c.bench_function("search_long_prefix", |b| {
        b.iter(|| {
            rt.block_on(async { black_box(index.search("tomate variété 42", "fr", 50, 0).await) })
        })
    });

    c.bench_function("search_deep_page", |b| {
        b.iter(|| rt.block_on(async { black_box(index.search("tomato", "en", 50, 9000).await) }))
    });
}

fn bench_index_maintenance(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (store, index) = rt.block_on(setup());

    let mut group = c.benchmark_group("index_maintenance");
    group.sample_size(10);

    group.bench_function("rebuild_10k_nodes", |b| {
        b.iter(|| rt.block_on(async { black_box(index.rebuild(&store).await) }))
    });

    let node = rt.block_on(store.get("ingredient-7-7")).unwrap();
    group.bench_function("apply_single_update", |b| {
        b.iter(|| {
            rt.block_on(async {
                index.apply(&TaxonomyEvent::NodeUpdated(node.clone())).await;
            })
        })
    });

    group.finish();
}

criterion_group!(benches, bench_prefix_search, bench_index_maintenance);
criterion_main!(benches);
