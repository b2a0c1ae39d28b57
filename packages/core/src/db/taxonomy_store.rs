//! TaxonomyStore - Invariant-Preserving Node Graph
//!
//! Authoritative in-memory storage of taxonomy nodes and their parent/child
//! edges. All graph changes go through `upsert` and `delete`, which is where the
//! structural invariants are enforced:
//!
//! 1. Edges are symmetric (`A ∈ parents(B) ⟺ B ∈ children(A)`)
//! 2. No node references itself
//! 3. The parent relation is acyclic (a DAG; several parents and roots are legal)
//! 4. Every edge endpoint exists
//! 5. `names` is never empty
//!
//! # Architecture
//!
//! - **Arena + id adjacency**: nodes live in a `HashMap<id, Arc<TaxonomyNode>>`,
//!   edges are id sets resolved through the map
//! - **Copy-on-write records**: a mutation clones the touched records, edits the
//!   clones and swaps the `Arc`s in under one short write-lock acquisition, so a
//!   reader sees either the old or the new record, never a partial one
//! - **Write section**: a mutex serialises writers; validation runs under the
//!   read lock while the section is held, so readers keep going during checks
//! - **Events**: every committed change is broadcast as a `TaxonomyEvent`
//!
//! # Examples
//!
//! ```rust
//! use mise_taxonomy::db::TaxonomyStore;
//! use mise_taxonomy::models::TaxonomyNode;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = TaxonomyStore::new();
//! store.upsert(TaxonomyNode::new("fruits", [("en", "Fruits")])).await?;
//! store
//!     .upsert(TaxonomyNode::new("apple", [("en", "Apple")]).with_parent("fruits"))
//!     .await?;
//!
//! let children = store.children_of("fruits").await?;
//! assert_eq!(children[0].canonical_id, "apple");
//! # Ok(())
//! # }
//! ```

use crate::db::error::StoreError;
use crate::db::events::TaxonomyEvent;
use crate::models::TaxonomyNode;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, MutexGuard, RwLock};

/// Broadcast channel capacity for domain events
pub const DOMAIN_EVENT_CHANNEL_CAPACITY: usize = 128;

type NodeMap = HashMap<String, Arc<TaxonomyNode>>;

/// Result of a successful upsert
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    /// The node did not exist before
    Created(Arc<TaxonomyNode>),
    /// The node existed and at least one field or edge changed
    Updated(Arc<TaxonomyNode>),
    /// The node existed with identical content; nothing was written
    Unchanged(Arc<TaxonomyNode>),
}

impl UpsertOutcome {
    /// The committed (or already present) record
    pub fn node(&self) -> &Arc<TaxonomyNode> {
        match self {
            UpsertOutcome::Created(node)
            | UpsertOutcome::Updated(node)
            | UpsertOutcome::Unchanged(node) => node,
        }
    }

    /// True unless the upsert was a no-op
    pub fn is_change(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged(_))
    }
}

/// Shared, invariant-preserving taxonomy graph
pub struct TaxonomyStore {
    nodes: RwLock<NodeMap>,

    /// Serialises writers; held for one mutation or a whole batch
    write_section: Mutex<()>,

    /// Broadcast channel for domain events
    event_tx: broadcast::Sender<TaxonomyEvent>,
}

impl Default for TaxonomyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaxonomyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_event_capacity(DOMAIN_EVENT_CHANNEL_CAPACITY)
    }

    /// Create an empty store with a custom event channel capacity
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            nodes: RwLock::new(HashMap::new()),
            write_section: Mutex::new(()),
            event_tx,
        }
    }

    /// Subscribe to domain events
    ///
    /// Events are delivered in commit order. A slow subscriber that falls more
    /// than the channel capacity behind receives `RecvError::Lagged`.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<TaxonomyEvent> {
        self.event_tx.subscribe()
    }

    /// Enter the write section
    ///
    /// Other writers wait until the returned `StoreWriter` is dropped. Readers
    /// are not blocked. Use this to group a batch of mutations (an import run)
    /// or to keep derived state in step with commits.
    pub async fn write_section(&self) -> StoreWriter<'_> {
        let guard = self.write_section.lock().await;
        StoreWriter {
            store: self,
            _guard: guard,
        }
    }

    /// Insert or replace a node by canonical id
    ///
    /// See [`StoreWriter::upsert`] for validation and edge semantics.
    pub async fn upsert(&self, node: TaxonomyNode) -> Result<UpsertOutcome, StoreError> {
        self.write_section().await.upsert(node).await
    }

    /// Delete a node and every edge referencing it
    ///
    /// See [`StoreWriter::delete`].
    pub async fn delete(&self, id: &str) -> Result<Arc<TaxonomyNode>, StoreError> {
        self.write_section().await.delete(id).await
    }

    /// Get a node by id
    pub async fn get(&self, id: &str) -> Result<Arc<TaxonomyNode>, StoreError> {
        self.nodes
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id))
    }

    /// Check whether a node exists
    pub async fn contains(&self, id: &str) -> bool {
        self.nodes.read().await.contains_key(id)
    }

    /// Direct children of a node, in id order
    pub async fn children_of(&self, id: &str) -> Result<Vec<Arc<TaxonomyNode>>, StoreError> {
        let nodes = self.nodes.read().await;
        let node = nodes.get(id).ok_or_else(|| StoreError::not_found(id))?;
        Ok(resolve_ids(&nodes, &node.child_ids))
    }

    /// Direct parents of a node, in id order
    pub async fn parents_of(&self, id: &str) -> Result<Vec<Arc<TaxonomyNode>>, StoreError> {
        let nodes = self.nodes.read().await;
        let node = nodes.get(id).ok_or_else(|| StoreError::not_found(id))?;
        Ok(resolve_ids(&nodes, &node.parent_ids))
    }

    /// Every canonical id, from a point-in-time copy of the key set
    pub async fn all_ids(&self) -> impl Iterator<Item = String> {
        let ids: Vec<String> = self.nodes.read().await.keys().cloned().collect();
        ids.into_iter()
    }

    /// Point-in-time copy of every record
    ///
    /// Records are shared `Arc`s, so this costs one pointer per node.
    pub async fn snapshot(&self) -> Vec<Arc<TaxonomyNode>> {
        self.nodes.read().await.values().cloned().collect()
    }

    /// Number of nodes
    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// True when the store holds no nodes
    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    /// Emit a domain event to all subscribers
    ///
    /// Ignores errors if no subscribers (expected in most tests).
    fn emit_event(&self, event: TaxonomyEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Exclusive writer handle returned by [`TaxonomyStore::write_section`]
pub struct StoreWriter<'a> {
    store: &'a TaxonomyStore,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> StoreWriter<'a> {
    /// Insert or replace a node by canonical id
    ///
    /// Both `parent_ids` and `child_ids` of `node` are authoritative for the
    /// new record; the symmetric side of every added or removed edge is
    /// updated on the peer. The call is all-or-nothing.
    ///
    /// # Errors
    ///
    /// - `Validation(EmptyId | EmptyNames | EmptyName | InvalidLanguage |
    ///   DuplicateLanguage | SelfReference)` for node-local problems
    /// - `DanglingReference` if a parent or child id does not exist
    /// - `Validation(CycleDetected)` if a proposed parent can reach the node
    ///   through the post-mutation parent relation
    pub async fn upsert(&mut self, mut node: TaxonomyNode) -> Result<UpsertOutcome, StoreError> {
        node.normalize_names()?;
        node.validate()?;

        let now = Utc::now();
        let (outcome, replacements) = {
            let nodes = self.store.nodes.read().await;
            let id = node.canonical_id.clone();
            let existing = nodes.get(&id).cloned();

            if let Some(existing) = &existing {
                if existing.same_content(&node) {
                    return Ok(UpsertOutcome::Unchanged(existing.clone()));
                }
            }

            for peer_id in node.parent_ids.iter().chain(node.child_ids.iter()) {
                if !nodes.contains_key(peer_id) {
                    return Err(StoreError::dangling_reference(&id, peer_id));
                }
            }

            if let Some(via) = find_cycle(&nodes, &node) {
                return Err(StoreError::cycle_detected(&id, via));
            }

            node.created_at = existing.as_ref().map(|e| e.created_at).unwrap_or(now);
            node.updated_at = now;

            let empty = BTreeSet::new();
            let (old_parents, old_children) = match &existing {
                Some(e) => (&e.parent_ids, &e.child_ids),
                None => (&empty, &empty),
            };

            let mut peers = PeerEdits::new(&nodes, now);
            for parent_id in old_parents.difference(&node.parent_ids) {
                peers.edit(parent_id, |p| {
                    p.child_ids.remove(&id);
                });
            }
            for parent_id in node.parent_ids.difference(old_parents) {
                peers.edit(parent_id, |p| {
                    p.child_ids.insert(id.clone());
                });
            }
            for child_id in old_children.difference(&node.child_ids) {
                peers.edit(child_id, |c| {
                    c.parent_ids.remove(&id);
                });
            }
            for child_id in node.child_ids.difference(old_children) {
                peers.edit(child_id, |c| {
                    c.parent_ids.insert(id.clone());
                });
            }
            let peers = peers.into_records();

            let node = Arc::new(node);
            let outcome = if existing.is_some() {
                UpsertOutcome::Updated(node.clone())
            } else {
                UpsertOutcome::Created(node.clone())
            };

            let mut replacements: Vec<Arc<TaxonomyNode>> = Vec::with_capacity(peers.len() + 1);
            replacements.push(node);
            replacements.extend(peers);
            (outcome, replacements)
        };

        self.commit(&replacements).await;

        tracing::debug!(
            "Upserted taxonomy node {} ({} peer records updated)",
            outcome.node().canonical_id,
            replacements.len() - 1
        );

        let mut records = replacements.into_iter();
        if let Some(first) = records.next() {
            match &outcome {
                UpsertOutcome::Created(_) => self.store.emit_event(TaxonomyEvent::NodeCreated(first)),
                _ => self.store.emit_event(TaxonomyEvent::NodeUpdated(first)),
            }
        }
        for peer in records {
            self.store.emit_event(TaxonomyEvent::NodeUpdated(peer));
        }

        Ok(outcome)
    }

    /// Delete a node and every edge referencing it
    ///
    /// Former children lose this parent edge and may become roots; they are
    /// never deleted themselves.
    ///
    /// # Errors
    ///
    /// `NotFound` if no node has this id.
    pub async fn delete(&mut self, id: &str) -> Result<Arc<TaxonomyNode>, StoreError> {
        let now = Utc::now();
        let (removed, peers) = {
            let nodes = self.store.nodes.read().await;
            let removed = nodes.get(id).cloned().ok_or_else(|| StoreError::not_found(id))?;

            let mut peers = PeerEdits::new(&nodes, now);
            for parent_id in &removed.parent_ids {
                peers.edit(parent_id, |p| {
                    p.child_ids.remove(id);
                });
            }
            for child_id in &removed.child_ids {
                peers.edit(child_id, |c| {
                    c.parent_ids.remove(id);
                });
            }
            let peers = peers.into_records();
            (removed, peers)
        };

        {
            let mut nodes = self.store.nodes.write().await;
            nodes.remove(id);
            for peer in &peers {
                nodes.insert(peer.canonical_id.clone(), peer.clone());
            }
        }

        tracing::debug!(
            "Deleted taxonomy node {} ({} peer records updated)",
            id,
            peers.len()
        );

        self.store.emit_event(TaxonomyEvent::NodeDeleted { id: id.to_string() });
        for peer in peers {
            self.store.emit_event(TaxonomyEvent::NodeUpdated(peer));
        }

        Ok(removed)
    }

    /// Get a node by id (same as [`TaxonomyStore::get`])
    pub async fn get(&self, id: &str) -> Result<Arc<TaxonomyNode>, StoreError> {
        self.store.get(id).await
    }

    /// Check whether a node exists
    pub async fn contains(&self, id: &str) -> bool {
        self.store.contains(id).await
    }

    /// Point-in-time copy of every record
    ///
    /// Consistent with all commits: no other writer can run while this handle
    /// is alive.
    pub async fn snapshot(&self) -> Vec<Arc<TaxonomyNode>> {
        self.store.snapshot().await
    }

    /// Swap the prepared records in under one write-lock acquisition
    async fn commit(&self, records: &[Arc<TaxonomyNode>]) {
        let mut nodes = self.store.nodes.write().await;
        for record in records {
            nodes.insert(record.canonical_id.clone(), record.clone());
        }
    }
}

/// Working copies of peer records touched by one mutation
struct PeerEdits<'n> {
    nodes: &'n NodeMap,
    now: DateTime<Utc>,
    staged: HashMap<String, TaxonomyNode>,
}

impl<'n> PeerEdits<'n> {
    fn new(nodes: &'n NodeMap, now: DateTime<Utc>) -> Self {
        Self {
            nodes,
            now,
            staged: HashMap::new(),
        }
    }

    /// Apply an edge edit to the working copy of a peer
    ///
    /// Peers are checked for existence before staging, so a missing id here
    /// is skipped.
    fn edit(&mut self, peer_id: &str, edit: impl FnOnce(&mut TaxonomyNode)) {
        if !self.staged.contains_key(peer_id) {
            match self.nodes.get(peer_id) {
                Some(record) => {
                    self.staged
                        .insert(peer_id.to_string(), TaxonomyNode::clone(record));
                }
                None => return,
            }
        }
        if let Some(peer) = self.staged.get_mut(peer_id) {
            edit(peer);
            peer.updated_at = self.now;
        }
    }

    fn into_records(self) -> Vec<Arc<TaxonomyNode>> {
        self.staged.into_values().map(Arc::new).collect()
    }
}

fn resolve_ids(nodes: &NodeMap, ids: &BTreeSet<String>) -> Vec<Arc<TaxonomyNode>> {
    ids.iter().filter_map(|id| nodes.get(id).cloned()).collect()
}

/// Look for a cycle the proposed record would close
///
/// Walks upward from every proposed parent through the parent relation as it
/// would look after the mutation: other nodes keep their stored parents,
/// except that the node's old child edges are replaced by its new child set.
/// Reaching the node itself means it would become its own ancestor. Returns the
/// proposed parent the cycle runs through.
fn find_cycle(nodes: &NodeMap, node: &TaxonomyNode) -> Option<String> {
    let target = node.canonical_id.as_str();
    let mut visited: HashSet<&str> = HashSet::new();

    for start in &node.parent_ids {
        let mut stack: Vec<&str> = vec![start.as_str()];
        while let Some(current) = stack.pop() {
            if current == target {
                return Some(start.clone());
            }
            if !visited.insert(current) {
                continue;
            }

            if node.child_ids.contains(current) {
                stack.push(target);
            }
            if let Some(record) = nodes.get(current) {
                stack.extend(
                    record
                        .parent_ids
                        .iter()
                        .map(String::as_str)
                        .filter(|parent| *parent != target),
                );
            }
        }
    }

    None
}

#[cfg(test)]
#[path = "taxonomy_store_test.rs"]
mod taxonomy_store_test;
