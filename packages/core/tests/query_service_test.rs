//! Integration tests for QueryService
//!
//! Tests cover:
//! - The serialized shape of search pages and summaries
//! - Store invariants after a mixed sequence of admin edits
//! - Readers running while imports and rebuilds swap the index

use mise_taxonomy::config::TaxonomyConfig;
use mise_taxonomy::import::{FeedFormat, InlineFeedSource};
use mise_taxonomy::services::QueryService;
use mise_taxonomy::{DietaryFlag, DietaryFlags, TaxonomyNode, TaxonomyStore};
use serde_json::json;
use std::sync::Arc;

fn fruit_feed(extra: usize) -> String {
    let mut entries = vec![
        json!({"id": "fruits", "names": {"en": "Fruits", "fr": "Fruits"}}),
        json!({"id": "apple", "names": {"en": "Apple", "fr": "Pomme"}, "parents": ["fruits"], "vegan": true}),
        json!({"id": "red-apple", "names": {"en": "Red Apple", "fr": "Pomme rouge"}, "parents": ["apple"]}),
    ];
    for i in 0..extra {
        entries.push(json!({
            "id": format!("apple-{}", i),
            "names": {"en": format!("Apple cultivar {}", i), "fr": format!("Pomme variété {}", i)},
            "parents": ["apple"]
        }));
    }
    json!({ "entries": entries }).to_string()
}

async fn loaded_service(extra: usize) -> QueryService {
    let service = QueryService::new(TaxonomyConfig::default());
    let source = InlineFeedSource::new("fruits.json", FeedFormat::Json, fruit_feed(extra));
    service.run_import_from(&source).await.unwrap();
    service
}

/// Check `A ∈ parents(B) ⟺ B ∈ children(A)` across the whole store
async fn assert_symmetric(store: &TaxonomyStore) {
    for node in store.snapshot().await {
        for parent in &node.parent_ids {
            let parent = store.get(parent).await.unwrap();
            assert!(parent.child_ids.contains(&node.canonical_id));
        }
        for child in &node.child_ids {
            let child = store.get(child).await.unwrap();
            assert!(child.parent_ids.contains(&node.canonical_id));
        }
    }
}

// =========================================================================
// Serialized contract
// =========================================================================

#[tokio::test]
async fn test_search_page_json_shape() {
    let service = loaded_service(0).await;
    let page = service.search("pomme", "fr", 1, 0).await.unwrap();

    let value = serde_json::to_value(&page).unwrap();
    assert_eq!(
        value,
        json!({
            "items": [{
                "id": "apple",
                "displayName": "Pomme",
                "isCustom": false,
                "dietaryFlags": {"vegan": "yes", "vegetarian": "unknown"}
            }],
            "total": 2
        })
    );
}

#[tokio::test]
async fn test_stats_and_report_serialize_camel_case() {
    let service = loaded_service(2).await;

    let stats = serde_json::to_value(service.stats().await).unwrap();
    assert_eq!(stats["totalNodes"], 5);
    assert_eq!(stats["rootNodes"], 1);
    assert_eq!(stats["nodesPerCategory"]["fruits"], 4);
}

// =========================================================================
// Invariants through the facade
// =========================================================================

#[tokio::test]
async fn test_symmetry_after_mixed_admin_edits() {
    let service = loaded_service(3).await;

    let herbs = service
        .create_custom_node([("en", "Herbs")], Vec::new(), DietaryFlags::default())
        .await
        .unwrap();
    let basil = service
        .create_custom_node(
            [("en", "Basil"), ("fr", "Basilic")],
            vec![herbs.canonical_id.clone(), "fruits".to_string()],
            DietaryFlags {
                vegan: DietaryFlag::Yes,
                vegetarian: DietaryFlag::Yes,
            },
        )
        .await
        .unwrap();

    // Reparent a cultivar and drop another
    let cultivar = service.store().get("apple-0").await.unwrap();
    let mut moved = TaxonomyNode::clone(&cultivar);
    moved.parent_ids.clear();
    moved.parent_ids.insert(herbs.canonical_id.clone());
    service.upsert_node(moved).await.unwrap();
    service.delete_node("apple-1").await.unwrap();

    // A cycle attempt is refused and changes nothing
    let mut looped = TaxonomyNode::clone(&service.store().get(&herbs.canonical_id).await.unwrap());
    looped.parent_ids.insert(basil.canonical_id.clone());
    assert!(service.upsert_node(looped).await.is_err());

    assert_symmetric(service.store()).await;
    let parents = service.parents(&basil.canonical_id, "fr").await.unwrap();
    assert_eq!(parents.len(), 2);
    assert!(service.get("apple-1", "en").await.unwrap_err().is_not_found());
    assert!(service.search("apple cultivar 1", "en", 10, 0).await.unwrap().items.is_empty());
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_run_during_import_and_rebuild() {
    let service = Arc::new(loaded_service(50).await);

    let mut readers = Vec::new();
    for _ in 0..4 {
        let service = service.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let page = service.search("pomme", "fr", 100, 0).await.unwrap();
                // Either before or after a swap, never a partial index
                assert_eq!(page.total, 52);
                assert_eq!(page.items.len(), 52);
                tokio::task::yield_now().await;
            }
        }));
    }

    let writer = {
        let service = service.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                let source = InlineFeedSource::new("fruits.json", FeedFormat::Json, fruit_feed(50));
                let report = service.run_import_from(&source).await.unwrap();
                assert_eq!(report.unchanged, 53);
                service.rebuild_index().await;
            }
        })
    };

    for reader in readers {
        reader.await.unwrap();
    }
    writer.await.unwrap();
}
