//! Query Service - Public Facade over Store, Index and Import
//!
//! `QueryService` is the single entry point collaborators use: the recipe
//! linker only needs `get`, the admin screens use everything.
//!
//! # Architecture
//!
//! - **Reads**: prefix search goes to the `SearchIndex`; lookups and edge
//!   expansion go to the `TaxonomyStore`. Display names are resolved per call
//!   from the caller's language, then the configured fallback language, then
//!   the canonical id.
//! - **Writes**: admin mutations hold the store's write section while the
//!   index is updated, so index changes land in commit order.
//! - **Imports**: a run is followed by a full index rebuild.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mise_taxonomy::config::TaxonomyConfig;
//! use mise_taxonomy::services::QueryService;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let service = QueryService::new(TaxonomyConfig::with_import_dir("./data/taxonomy"));
//! let report = service.run_import("fruits.json").await?;
//! println!("{} records imported", report.succeeded());
//!
//! let page = service.search("pom", "fr", 10, 0).await?;
//! for item in page.items {
//!     println!("{} ({})", item.display_name, item.id);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::TaxonomyConfig;
use crate::db::{TaxonomyEvent, TaxonomyStore, UpsertOutcome};
use crate::import::{FeedSource, ImportPipeline, ImportReport};
use crate::models::{normalize_language, DietaryFlags, NodeSummary, TaxonomyNode};
use crate::search::{normalize_text, IndexStats, SearchIndex};
use crate::services::error::QueryServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub items: Vec<NodeSummary>,
    /// Number of matches before paging
    pub total: usize,
}

/// Full view of one node with its direct neighbours resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetail {
    pub id: String,
    pub display_name: String,
    pub names: BTreeMap<String, String>,
    pub parents: Vec<NodeSummary>,
    pub children: Vec<NodeSummary>,
    pub dietary_flags: DietaryFlags,
    pub is_custom: bool,
    pub external_refs: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counts over the whole taxonomy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyStats {
    pub total_nodes: usize,
    pub custom_nodes: usize,
    pub root_nodes: usize,
    /// Root id to number of nodes below it; a node under several roots counts
    /// toward each of them
    pub nodes_per_category: BTreeMap<String, usize>,
}

/// Public facade over the taxonomy core
pub struct QueryService {
    store: Arc<TaxonomyStore>,
    index: Arc<SearchIndex>,
    pipeline: ImportPipeline,
    config: TaxonomyConfig,
}

impl QueryService {
    /// Create a service with an empty store
    pub fn new(config: TaxonomyConfig) -> Self {
        let store = Arc::new(TaxonomyStore::with_event_capacity(config.event_channel_capacity));
        Self::with_store(store, config)
    }

    /// Create a service over an existing store
    ///
    /// The index starts empty; call [`QueryService::rebuild_index`] if the
    /// store already holds nodes.
    pub fn with_store(store: Arc<TaxonomyStore>, config: TaxonomyConfig) -> Self {
        Self {
            index: Arc::new(SearchIndex::new(&config)),
            pipeline: ImportPipeline::new(&config),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<TaxonomyStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<SearchIndex> {
        &self.index
    }

    pub fn config(&self) -> &TaxonomyConfig {
        &self.config
    }

    /// Prefix search with paging
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `limit` is negative or above the configured
    /// maximum page size, or if `skip` is negative. A query shorter than the
    /// minimum prefix length is not an error: it yields an empty page.
    pub async fn search(
        &self,
        query: &str,
        language: &str,
        limit: i64,
        skip: i64,
    ) -> Result<SearchPage, QueryServiceError> {
        if limit < 0 {
            return Err(QueryServiceError::invalid_argument(format!(
                "limit must not be negative (got {})",
                limit
            )));
        }
        if limit as u64 > self.config.max_page_size as u64 {
            return Err(QueryServiceError::invalid_argument(format!(
                "limit must be at most {} (got {})",
                self.config.max_page_size, limit
            )));
        }
        if skip < 0 {
            return Err(QueryServiceError::invalid_argument(format!(
                "skip must not be negative (got {})",
                skip
            )));
        }
        let offset = usize::try_from(skip).unwrap_or(usize::MAX);

        let hits = self.index.search(query, language, limit as usize, offset).await;

        let mut items = Vec::with_capacity(hits.hits.len());
        for hit in &hits.hits {
            // A node deleted after the index read is simply left out
            if let Ok(node) = self.store.get(&hit.canonical_id).await {
                items.push(self.summarize(&node, language));
            }
        }

        Ok(SearchPage {
            items,
            total: hits.total,
        })
    }

    /// Point lookup with neighbours resolved
    pub async fn get(&self, id: &str, language: &str) -> Result<NodeDetail, QueryServiceError> {
        let node = self.store.get(id).await?;
        let parents = self.summarize_sorted(self.store.parents_of(id).await?, language);
        let children = self.summarize_sorted(self.store.children_of(id).await?, language);

        Ok(NodeDetail {
            id: node.canonical_id.clone(),
            display_name: self.display_name(&node, language).to_string(),
            names: node.names.clone(),
            parents,
            children,
            dietary_flags: node.dietary_flags,
            is_custom: node.is_custom,
            external_refs: node.external_refs.clone(),
            created_at: node.created_at,
            updated_at: node.updated_at,
        })
    }

    /// Direct children, sorted by display name then id
    pub async fn children(&self, id: &str, language: &str) -> Result<Vec<NodeSummary>, QueryServiceError> {
        let nodes = self.store.children_of(id).await?;
        Ok(self.summarize_sorted(nodes, language))
    }

    /// Direct parents, sorted by display name then id
    pub async fn parents(&self, id: &str, language: &str) -> Result<Vec<NodeSummary>, QueryServiceError> {
        let nodes = self.store.parents_of(id).await?;
        Ok(self.summarize_sorted(nodes, language))
    }

    /// Counts from one pass over `TaxonomyStore::snapshot` rather than `all_ids`
    pub async fn stats(&self) -> TaxonomyStats {
        let snapshot = self.store.snapshot().await;
        compute_stats(&snapshot)
    }

    /// Search index statistics
    pub async fn index_stats(&self) -> IndexStats {
        self.index.stats().await
    }

    /// Admin edit: insert or replace a node and update the index
    pub async fn upsert_node(&self, node: TaxonomyNode) -> Result<UpsertOutcome, QueryServiceError> {
        let mut writer = self.store.write_section().await;
        let outcome = writer.upsert(node).await?;

        // Peers only gain or lose edges, so only this node's names can change
        match &outcome {
            UpsertOutcome::Created(node) => {
                self.index.apply(&TaxonomyEvent::NodeCreated(node.clone())).await
            }
            UpsertOutcome::Updated(node) => {
                self.index.apply(&TaxonomyEvent::NodeUpdated(node.clone())).await
            }
            UpsertOutcome::Unchanged(_) => {}
        }
        drop(writer);

        Ok(outcome)
    }

    /// Admin edit: create a custom node with a freshly minted id
    pub async fn create_custom_node<I, L, N>(
        &self,
        names: I,
        parent_ids: impl IntoIterator<Item = String>,
        dietary_flags: DietaryFlags,
    ) -> Result<Arc<TaxonomyNode>, QueryServiceError>
    where
        I: IntoIterator<Item = (L, N)>,
        L: AsRef<str>,
        N: Into<String>,
    {
        let mut node = TaxonomyNode::new_custom(names).with_dietary_flags(dietary_flags);
        node.parent_ids.extend(parent_ids);

        let outcome = self.upsert_node(node).await?;
        tracing::info!("Created custom taxonomy node {}", outcome.node().canonical_id);
        Ok(outcome.node().clone())
    }

    /// Admin edit: delete a node and drop it from the index
    pub async fn delete_node(&self, id: &str) -> Result<Arc<TaxonomyNode>, QueryServiceError> {
        let mut writer = self.store.write_section().await;
        let removed = writer.delete(id).await?;
        self.index
            .apply(&TaxonomyEvent::NodeDeleted { id: id.to_string() })
            .await;
        drop(writer);

        Ok(removed)
    }

    /// Import a feed file from the import directory, then rebuild the index
    pub async fn run_import(&self, requested: &str) -> Result<ImportReport, QueryServiceError> {
        let report = self.pipeline.run(&self.store, requested).await?;
        self.index.rebuild(&self.store).await;
        Ok(report)
    }

    /// Import from any feed source, then rebuild the index
    pub async fn run_import_from(&self, source: &dyn FeedSource) -> Result<ImportReport, QueryServiceError> {
        let report = self.pipeline.run_source(&self.store, source).await?;
        self.index.rebuild(&self.store).await;
        Ok(report)
    }

    /// Full index rebuild from the store
    pub async fn rebuild_index(&self) -> IndexStats {
        self.index.rebuild(&self.store).await
    }

    fn display_name<'n>(&self, node: &'n TaxonomyNode, language: &str) -> &'n str {
        node.display_name(language, &self.config.fallback_language)
    }

    fn summarize(&self, node: &TaxonomyNode, language: &str) -> NodeSummary {
        node.summary(&normalize_language(language), &self.config.fallback_language)
    }

    fn summarize_sorted(&self, nodes: Vec<Arc<TaxonomyNode>>, language: &str) -> Vec<NodeSummary> {
        let mut summaries: Vec<NodeSummary> = nodes.iter().map(|n| self.summarize(n, language)).collect();
        summaries.sort_by_cached_key(|s| (normalize_text(&s.display_name), s.id.clone()));
        summaries
    }
}

/// Total, custom and root counts plus descendants per root
fn compute_stats(snapshot: &[Arc<TaxonomyNode>]) -> TaxonomyStats {
    let by_id: HashMap<&str, &TaxonomyNode> = snapshot
        .iter()
        .map(|n| (n.canonical_id.as_str(), n.as_ref()))
        .collect();

    let mut stats = TaxonomyStats {
        total_nodes: snapshot.len(),
        ..TaxonomyStats::default()
    };
    let mut memo: HashMap<&str, BTreeSet<&str>> = HashMap::new();

    for node in snapshot {
        if node.is_custom {
            stats.custom_nodes += 1;
        }
        if node.is_root() {
            stats.root_nodes += 1;
            stats
                .nodes_per_category
                .entry(node.canonical_id.clone())
                .or_insert(0);
            continue;
        }
        for root in roots_of(&node.canonical_id, &by_id, &mut memo) {
            *stats.nodes_per_category.entry(root.to_string()).or_insert(0) += 1;
        }
    }

    stats
}

/// Every root reachable by walking parent edges upward from `id`
fn roots_of<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a TaxonomyNode>,
    memo: &mut HashMap<&'a str, BTreeSet<&'a str>>,
) -> BTreeSet<&'a str> {
    if let Some(roots) = memo.get(id) {
        return roots.clone();
    }
    let Some(&node) = by_id.get(id) else {
        return BTreeSet::new();
    };

    let roots = if node.is_root() {
        BTreeSet::from([node.canonical_id.as_str()])
    } else {
        let mut roots = BTreeSet::new();
        for parent in &node.parent_ids {
            roots.extend(roots_of(parent.as_str(), by_id, memo));
        }
        roots
    };

    memo.insert(node.canonical_id.as_str(), roots.clone());
    roots
}
