//! Event Emission Tests
//!
//! Tests that verify domain events are broadcast after each committed
//! mutation, in commit order, with peer records whose edges changed reported
//! as updates. Rejected mutations emit nothing.

#[cfg(test)]
mod event_emission_tests {
    use anyhow::Result;
    use mise_taxonomy::db::{TaxonomyEvent, TaxonomyStore};
    use mise_taxonomy::import::{FeedRecord, ImportPipeline};
    use mise_taxonomy::{TaxonomyConfig, TaxonomyNode};
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::{timeout, Duration};

    async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<TaxonomyEvent>) -> TaxonomyEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event")
    }

    #[tokio::test]
    async fn test_create_emits_node_then_peers() -> Result<()> {
        let store = TaxonomyStore::new();
        store
            .upsert(TaxonomyNode::new("fruits", [("en", "Fruits")]))
            .await?;

        let mut rx = store.subscribe_to_events();
        store
            .upsert(TaxonomyNode::new("apple", [("en", "Apple")]).with_parent("fruits"))
            .await?;

        match next_event(&mut rx).await {
            TaxonomyEvent::NodeCreated(node) => {
                assert_eq!(node.canonical_id, "apple");
                assert!(node.parent_ids.contains("fruits"));
            }
            other => panic!("Expected NodeCreated, got {:?}", other),
        }
        match next_event(&mut rx).await {
            TaxonomyEvent::NodeUpdated(node) => {
                assert_eq!(node.canonical_id, "fruits");
                assert!(node.child_ids.contains("apple"));
            }
            other => panic!("Expected NodeUpdated, got {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_emits_deleted_then_peers() -> Result<()> {
        let store = TaxonomyStore::new();
        store.upsert(TaxonomyNode::new("fruits", [("en", "Fruits")])).await?;
        store
            .upsert(TaxonomyNode::new("apple", [("en", "Apple")]).with_parent("fruits"))
            .await?;

        let mut rx = store.subscribe_to_events();
        store.delete("fruits").await?;

        let event = next_event(&mut rx).await;
        assert_eq!(event.event_type(), "node:deleted");
        assert_eq!(event.node_id(), "fruits");

        match next_event(&mut rx).await {
            TaxonomyEvent::NodeUpdated(node) => {
                assert_eq!(node.canonical_id, "apple");
                assert!(node.is_root());
            }
            other => panic!("Expected NodeUpdated, got {:?}", other),
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_and_unchanged_mutations_emit_nothing() -> Result<()> {
        let store = TaxonomyStore::new();
        let fruits = TaxonomyNode::new("fruits", [("en", "Fruits")]);
        store.upsert(fruits.clone()).await?;

        let mut rx = store.subscribe_to_events();

        store.upsert(fruits).await?;
        assert!(store
            .upsert(TaxonomyNode::new("apple", [("en", "Apple")]).with_parent("ghost"))
            .await
            .is_err());
        assert!(store.delete("ghost").await.is_err());

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        Ok(())
    }

    #[tokio::test]
    async fn test_import_emits_in_topological_order() -> Result<()> {
        let store = TaxonomyStore::new();
        let mut rx = store.subscribe_to_events();

        let records = vec![
            FeedRecord::new("red-apple", [("en", "Red Apple")]).with_parent("apple"),
            FeedRecord::new("apple", [("en", "Apple")]).with_parent("fruits"),
            FeedRecord::new("fruits", [("en", "Fruits")]),
        ];
        ImportPipeline::new(&TaxonomyConfig::default())
            .run_records(&store, "inline", records)
            .await?;

        let mut created = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TaxonomyEvent::NodeCreated(node) = event {
                created.push(node.canonical_id.clone());
            }
        }
        assert_eq!(created, vec!["fruits", "apple", "red-apple"]);

        Ok(())
    }
}
