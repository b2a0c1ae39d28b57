//! Domain Events for TaxonomyStore
//!
//! This module defines the domain events emitted by `TaxonomyStore` when the
//! graph changes. Collaborators (recipe linking, admin UI refresh) subscribe
//! without coupling to the store internals.
//!
//! # Event Flow
//!
//! 1. TaxonomyStore commits a mutation under its write section
//! 2. One event per touched node is sent on the broadcast channel, in commit order
//! 3. Subscribers receive the events asynchronously
//!
//! Events carry the committed record so consumers never need to read back.

use crate::models::TaxonomyNode;
use std::sync::Arc;

/// Domain events emitted by TaxonomyStore
#[derive(Debug, Clone)]
pub enum TaxonomyEvent {
    /// A new node was created
    NodeCreated(Arc<TaxonomyNode>),

    /// An existing node changed, either directly or because a peer's edge changed
    NodeUpdated(Arc<TaxonomyNode>),

    /// A node was deleted
    NodeDeleted { id: String },
}

impl TaxonomyEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            TaxonomyEvent::NodeCreated(_) => "node:created",
            TaxonomyEvent::NodeUpdated(_) => "node:updated",
            TaxonomyEvent::NodeDeleted { .. } => "node:deleted",
        }
    }

    /// Id of the node the event is about
    pub fn node_id(&self) -> &str {
        match self {
            TaxonomyEvent::NodeCreated(node) | TaxonomyEvent::NodeUpdated(node) => {
                &node.canonical_id
            }
            TaxonomyEvent::NodeDeleted { id } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_and_node_id() {
        let node = Arc::new(TaxonomyNode::new("basil", [("en", "Basil")]));

        let created = TaxonomyEvent::NodeCreated(node.clone());
        assert_eq!(created.event_type(), "node:created");
        assert_eq!(created.node_id(), "basil");

        let updated = TaxonomyEvent::NodeUpdated(node);
        assert_eq!(updated.event_type(), "node:updated");

        let deleted = TaxonomyEvent::NodeDeleted {
            id: "basil".to_string(),
        };
        assert_eq!(deleted.event_type(), "node:deleted");
        assert_eq!(deleted.node_id(), "basil");
    }

    #[test]
    fn test_subscriber_receives_committed_record() {
        let store = crate::db::TaxonomyStore::new();
        let mut rx = store.subscribe_to_events();

        let outcome = tokio_test::block_on(store.upsert(TaxonomyNode::new("basil", [("EN", " Basil ")])))
            .unwrap();

        match rx.try_recv().unwrap() {
            TaxonomyEvent::NodeCreated(node) => {
                assert!(Arc::ptr_eq(&node, outcome.node()));
                assert_eq!(node.name_in("en"), Some("Basil"));
            }
            other => panic!("Expected NodeCreated, got {:?}", other),
        }
    }
}
