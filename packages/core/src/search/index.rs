//! Per-Language Prefix Index for Autocomplete
//!
//! Answers "nodes whose name in language L starts with P" without scanning the
//! store.
//!
//! # Architecture
//!
//! The index keeps one sorted map per language of
//! `normalised name → {canonical_id}` plus a reverse map
//! `canonical_id → [(language, normalised name)]`. A prefix query is a single
//! `BTreeMap::range` scan starting at the prefix, so results come out already
//! ordered by normalised name, with the id set giving a stable tie-break.
//!
//! Everything in the index is reproducible by re-scanning the store.
//!
//! # Consistency
//!
//! - **Rebuild**: a fresh `IndexSnapshot` is built off-lock and published with
//!   one pointer swap; in-flight searches see the old or the new index, never a mix
//! - **Incremental**: `apply` rewrites only the entries of the node named by
//!   the event, using the reverse map to drop its previous names

use crate::config::TaxonomyConfig;
use crate::db::{TaxonomyEvent, TaxonomyStore};
use crate::models::{normalize_language, TaxonomyNode};
use crate::search::normalize::{normalize_text, prefix_len};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// One matching (name, node) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub canonical_id: String,
    /// Normalised name that matched the prefix
    pub matched_name: String,
}

/// A page of prefix matches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHits {
    pub hits: Vec<SearchHit>,
    /// Number of matches before paging
    pub total: usize,
    /// Language the search pass actually ran in (after fallback)
    pub language: String,
}

/// Index statistics (for debugging/monitoring)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Distinct names per language
    pub entries_per_language: BTreeMap<String, usize>,
    /// Number of nodes with at least one indexed name
    pub indexed_nodes: usize,
    /// Last full rebuild (None if never rebuilt)
    pub last_rebuild: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct LanguageIndex {
    entries: BTreeMap<String, BTreeSet<String>>,
}

/// Immutable-once-published index contents
#[derive(Debug, Clone, Default)]
struct IndexSnapshot {
    languages: HashMap<String, LanguageIndex>,
    by_node: HashMap<String, Vec<(String, String)>>,
    built_at: Option<DateTime<Utc>>,
}

impl IndexSnapshot {
    fn build<'a>(nodes: impl IntoIterator<Item = &'a TaxonomyNode>) -> Self {
        let mut snapshot = Self::default();
        for node in nodes {
            snapshot.insert_node(node);
        }
        snapshot.built_at = Some(Utc::now());
        snapshot
    }

    fn insert_node(&mut self, node: &TaxonomyNode) {
        let mut keys = Vec::with_capacity(node.names.len());
        for (language, name) in &node.names {
            let language = normalize_language(language);
            let normalized = normalize_text(name);
            if normalized.is_empty() {
                continue;
            }
            self.languages
                .entry(language.clone())
                .or_default()
                .entries
                .entry(normalized.clone())
                .or_default()
                .insert(node.canonical_id.clone());
            keys.push((language, normalized));
        }
        if !keys.is_empty() {
            self.by_node.insert(node.canonical_id.clone(), keys);
        }
    }

    fn remove_node(&mut self, id: &str) {
        let Some(keys) = self.by_node.remove(id) else {
            return;
        };
        for (language, normalized) in keys {
            let Some(index) = self.languages.get_mut(&language) else {
                continue;
            };
            if let Some(ids) = index.entries.get_mut(&normalized) {
                ids.remove(id);
                if ids.is_empty() {
                    index.entries.remove(&normalized);
                }
            }
            if index.entries.is_empty() {
                self.languages.remove(&language);
            }
        }
    }

    fn search(&self, prefix: &str, language: &str, limit: usize, offset: usize) -> SearchHits {
        let Some(index) = self.languages.get(language) else {
            return SearchHits {
                language: language.to_string(),
                ..SearchHits::default()
            };
        };

        let matches = index
            .entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(prefix))
            .flat_map(|(name, ids)| ids.iter().map(move |id| (name, id)));

        let mut hits = Vec::with_capacity(limit.min(64));
        let mut total = 0;
        for (position, (name, id)) in matches.enumerate() {
            total += 1;
            if position >= offset && hits.len() < limit {
                hits.push(SearchHit {
                    canonical_id: id.clone(),
                    matched_name: name.clone(),
                });
            }
        }

        SearchHits {
            hits,
            total,
            language: language.to_string(),
        }
    }
}

/// Derived, per-language prefix index over the taxonomy store
pub struct SearchIndex {
    current: RwLock<Arc<IndexSnapshot>>,

    /// Language searched when the requested one has no entries
    default_language: String,

    /// Shorter prefixes return an empty result without scanning
    min_prefix_len: usize,
}

impl SearchIndex {
    /// Create an empty index using the configured default language and
    /// minimum prefix length
    pub fn new(config: &TaxonomyConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(IndexSnapshot::default())),
            default_language: normalize_language(&config.default_language),
            min_prefix_len: config.min_prefix_len.max(1),
        }
    }

    /// Full re-scan of the store, published atomically
    ///
    /// Holds the store's write section for the duration so no commit can slip
    /// in between the snapshot and the swap. Readers are never blocked.
    pub async fn rebuild(&self, store: &TaxonomyStore) -> IndexStats {
        let writer = store.write_section().await;
        let nodes = writer.snapshot().await;
        let stats = self.rebuild_from(&nodes).await;
        drop(writer);
        stats
    }

    /// Build a fresh index from the given records and swap it in
    ///
    /// Callers are responsible for passing a consistent snapshot.
    pub async fn rebuild_from(&self, nodes: &[Arc<TaxonomyNode>]) -> IndexStats {
        let started = Instant::now();
        let snapshot = Arc::new(IndexSnapshot::build(nodes.iter().map(|n| n.as_ref())));

        // Atomic swap
        {
            let mut current = self.current.write().await;
            *current = snapshot;
        }

        let stats = self.stats().await;
        tracing::info!(
            "Rebuilt search index: {} nodes, {} languages in {}ms",
            stats.indexed_nodes,
            stats.entries_per_language.len(),
            started.elapsed().as_millis()
        );
        stats
    }

    /// Incrementally apply one store change
    ///
    /// Only the entries of the node named by the event are touched.
    pub async fn apply(&self, event: &TaxonomyEvent) {
        let mut current = self.current.write().await;
        let snapshot = Arc::make_mut(&mut current);
        match event {
            TaxonomyEvent::NodeCreated(node) | TaxonomyEvent::NodeUpdated(node) => {
                snapshot.remove_node(&node.canonical_id);
                snapshot.insert_node(node);
            }
            TaxonomyEvent::NodeDeleted { id } => snapshot.remove_node(id),
        }
        tracing::trace!("Applied {} for {} to search index", event.event_type(), event.node_id());
    }

    /// Prefix search in one language
    ///
    /// `prefix` is trimmed and lower-cased; prefixes shorter than the minimum
    /// length return an empty result. Results are ordered by normalised name,
    /// then canonical id, and paged with `offset`/`limit`. If the index holds
    /// no entries for `language`, the default language is searched instead.
    pub async fn search(&self, prefix: &str, language: &str, limit: usize, offset: usize) -> SearchHits {
        let prefix = normalize_text(prefix);
        let language = normalize_language(language);

        if prefix_len(&prefix) < self.min_prefix_len {
            return SearchHits {
                language,
                ..SearchHits::default()
            };
        }

        let snapshot = self.current.read().await;
        let language = if snapshot.languages.contains_key(&language) {
            language
        } else {
            tracing::debug!(
                "No index entries for language '{}', searching '{}' instead",
                language,
                self.default_language
            );
            self.default_language.clone()
        };

        snapshot.search(&prefix, &language, limit, offset)
    }

    /// Languages that currently have entries, sorted
    pub async fn languages(&self) -> Vec<String> {
        let snapshot = self.current.read().await;
        let mut languages: Vec<String> = snapshot.languages.keys().cloned().collect();
        languages.sort();
        languages
    }

    /// Get index statistics
    pub async fn stats(&self) -> IndexStats {
        let snapshot = self.current.read().await;
        IndexStats {
            entries_per_language: snapshot
                .languages
                .iter()
                .map(|(language, index)| (language.clone(), index.entries.len()))
                .collect(),
            indexed_nodes: snapshot.by_node.len(),
            last_rebuild: snapshot.built_at,
        }
    }
}
