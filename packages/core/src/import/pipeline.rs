//! Import Pipeline
//!
//! Loads a feed, orders its records parents-first and upserts them into the
//! `TaxonomyStore` as one batch.
//!
//! # Run phases
//!
//! 1. **Load + parse** outside any lock (file I/O never happens while the
//!    store's write section is held)
//! 2. **Pre-checks** per record: duplicate ids, reserved `custom:` ids, empty
//!    names, self references
//! 3. **Ordering**: Kahn's algorithm over the feed's own parent edges, ties
//!    broken by feed order. A cycle among feed records aborts the run before
//!    anything is written
//! 4. **Write**: one `write_section` for the whole batch; a failing record is
//!    reported and the batch continues
//!
//! Re-running an unchanged feed reports every record as unchanged.

use super::error::ImportError;
use super::feed::{parse_feed, FeedRecord, ParsedFeed};
use super::source::{FeedSource, FileFeedSource, ImportRoot};
use crate::config::TaxonomyConfig;
use crate::db::{TaxonomyStore, UpsertOutcome};
use crate::models::{is_custom_id, TaxonomyNode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

/// A record that could not be imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    pub external_id: String,
    pub reason: String,
}

impl ImportFailure {
    pub fn new(external_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of one import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub source: String,
    /// Records seen in the feed, including rejected ones
    pub total_records: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records whose id belongs to an existing custom node
    pub skipped_custom: usize,
    pub failed: Vec<ImportFailure>,
    pub duration_ms: u64,
}

impl ImportReport {
    /// Records that made it into the store (created, updated or unchanged)
    pub fn succeeded(&self) -> usize {
        self.created + self.updated + self.unchanged
    }

    /// True when no record failed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Batch importer for external taxonomy feeds
#[derive(Debug, Clone)]
pub struct ImportPipeline {
    import_dir: PathBuf,
}

impl ImportPipeline {
    /// Create a pipeline restricted to the configured import directory
    pub fn new(config: &TaxonomyConfig) -> Self {
        Self {
            import_dir: config.import_dir.clone(),
        }
    }

    /// Import a feed file from the import directory
    ///
    /// # Errors
    ///
    /// - `InvalidImportRoot` if the import directory is unusable
    /// - `OutsideImportRoot` / `SourceNotFound` / `UnsupportedFormat` for a bad
    ///   `requested` path; nothing is read in that case
    /// - `Read` / `Parse` if the document cannot be loaded
    /// - `FeedCycle` if the feed's parent references loop; nothing is written
    pub async fn run(&self, store: &TaxonomyStore, requested: &str) -> Result<ImportReport, ImportError> {
        let root = ImportRoot::new(&self.import_dir).await?;
        let source = FileFeedSource::open(&root, requested).await?;
        self.run_source(store, &source).await
    }

    /// Import from any feed source
    pub async fn run_source(
        &self,
        store: &TaxonomyStore,
        source: &dyn FeedSource,
    ) -> Result<ImportReport, ImportError> {
        let name = source.name();
        tracing::info!("Starting taxonomy import from {}", name);

        let content = source.load().await?;
        let parsed = parse_feed(&content, source.format(), &name)?;
        self.run_parsed(store, &name, parsed).await
    }

    /// Import already-parsed records
    pub async fn run_records(
        &self,
        store: &TaxonomyStore,
        source_name: &str,
        records: Vec<FeedRecord>,
    ) -> Result<ImportReport, ImportError> {
        let parsed = ParsedFeed {
            records,
            rejected: Vec::new(),
        };
        self.run_parsed(store, source_name, parsed).await
    }

    async fn run_parsed(
        &self,
        store: &TaxonomyStore,
        source_name: &str,
        parsed: ParsedFeed,
    ) -> Result<ImportReport, ImportError> {
        let started = Instant::now();
        let mut report = ImportReport {
            source: source_name.to_string(),
            total_records: parsed.records.len() + parsed.rejected.len(),
            failed: parsed.rejected,
            ..ImportReport::default()
        };

        let records = precheck(parsed.records, &mut report.failed);
        let ordered = topological_order(records)?;

        {
            let mut writer = store.write_section().await;

            // Existing custom nodes are never touched, even as an edge peer
            let mut custom_ids = HashSet::new();
            for record in &ordered {
                if let Ok(existing) = writer.get(&record.external_id).await {
                    if existing.is_custom {
                        custom_ids.insert(record.external_id.clone());
                    }
                }
            }

            let feed_ids: HashSet<&str> = ordered
                .iter()
                .map(|r| r.external_id.as_str())
                .filter(|id| !custom_ids.contains(*id))
                .collect();

            let mut feed_children: HashMap<&str, Vec<&str>> = HashMap::new();
            for record in &ordered {
                if !feed_ids.contains(record.external_id.as_str()) {
                    continue;
                }
                for parent in &record.parents {
                    feed_children
                        .entry(parent.as_str())
                        .or_default()
                        .push(record.external_id.as_str());
                }
            }

            for record in &ordered {
                let id = record.external_id.as_str();
                if custom_ids.contains(id) {
                    tracing::warn!("Skipping feed record {}: id belongs to a custom node", id);
                    report.skipped_custom += 1;
                    continue;
                }
                if let Some(parent) = record.parents.iter().find(|p| custom_ids.contains(p.as_str())) {
                    let failure = ImportFailure::new(id, format!("parent {} is a custom node", parent));
                    tracing::warn!("Failed to import feed record {}: {}", id, failure.reason);
                    report.failed.push(failure);
                    continue;
                }

                let existing = writer.get(id).await.ok();

                let mut child_ids: BTreeSet<String> = existing
                    .as_ref()
                    .map(|node| {
                        node.child_ids
                            .iter()
                            .filter(|c| !feed_ids.contains(c.as_str()))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                for child in feed_children.get(id).into_iter().flatten() {
                    if writer.contains(child).await {
                        child_ids.insert((*child).to_string());
                    }
                }

                // Custom parents are admin edges the feed cannot see
                let mut parent_ids: BTreeSet<String> = record.parents.iter().cloned().collect();
                if let Some(node) = &existing {
                    for parent in &node.parent_ids {
                        if parent_ids.contains(parent) {
                            continue;
                        }
                        if matches!(writer.get(parent).await, Ok(peer) if peer.is_custom) {
                            parent_ids.insert(parent.clone());
                        }
                    }
                }

                let now = Utc::now();
                let node = TaxonomyNode {
                    canonical_id: id.to_string(),
                    names: record.names.clone(),
                    parent_ids,
                    child_ids,
                    dietary_flags: record.dietary_flags,
                    is_custom: false,
                    external_refs: record.external_refs.clone(),
                    created_at: existing.as_ref().map(|n| n.created_at).unwrap_or(now),
                    updated_at: now,
                };

                match writer.upsert(node).await {
                    Ok(UpsertOutcome::Created(_)) => report.created += 1,
                    Ok(UpsertOutcome::Updated(_)) => report.updated += 1,
                    Ok(UpsertOutcome::Unchanged(_)) => report.unchanged += 1,
                    Err(e) => {
                        tracing::warn!("Failed to import feed record {}: {}", id, e);
                        report.failed.push(ImportFailure::new(id, e.to_string()));
                    }
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Imported taxonomy feed {}: {} created, {} updated, {} unchanged, {} skipped, {} failed in {}ms",
            report.source,
            report.created,
            report.updated,
            report.unchanged,
            report.skipped_custom,
            report.failed.len(),
            report.duration_ms
        );
        Ok(report)
    }
}

/// Drop records that can be rejected without looking at the store
fn precheck(records: Vec<FeedRecord>, failed: &mut Vec<ImportFailure>) -> Vec<FeedRecord> {
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(records.len());

    for mut record in records {
        let id = record.external_id.trim().to_string();
        let reason = if id.is_empty() {
            Some("record has an empty id".to_string())
        } else if !seen.insert(id.clone()) {
            Some("duplicate id in feed".to_string())
        } else if is_custom_id(&id) {
            Some("id uses the reserved custom id prefix".to_string())
        } else if record.names.values().all(|name| name.trim().is_empty()) {
            Some("record has no names".to_string())
        } else if record.parents.iter().any(|p| p == &id) {
            Some("record lists itself as a parent".to_string())
        } else {
            record
                .parents
                .iter()
                .find(|p| is_custom_id(p))
                .map(|p| format!("parent {} uses the reserved custom id prefix", p))
        };

        match reason {
            Some(reason) => {
                tracing::warn!("Rejected feed record {}: {}", id, reason);
                failed.push(ImportFailure::new(id, reason));
            }
            None => {
                record.external_id = id;
                record.parents.dedup();
                accepted.push(record);
            }
        }
    }

    accepted
}

/// Order records so every in-feed parent precedes its children
///
/// Kahn's algorithm; among records that are ready at the same time the one
/// that appears first in the feed goes first.
fn topological_order(records: Vec<FeedRecord>) -> Result<Vec<FeedRecord>, ImportError> {
    let position: HashMap<&str, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.external_id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; records.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    for (i, record) in records.iter().enumerate() {
        let in_feed_parents: BTreeSet<usize> = record
            .parents
            .iter()
            .filter_map(|p| position.get(p.as_str()).copied())
            .collect();
        for parent in in_feed_parents {
            children[parent].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..records.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(records.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &child in &children[next] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() < records.len() {
        let mut ids: Vec<String> = (0..records.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| records[i].external_id.clone())
            .collect();
        ids.sort();
        tracing::warn!("Aborting import: feed parent cycle through {}", ids.join(", "));
        return Err(ImportError::FeedCycle { ids });
    }

    let mut slots: Vec<Option<FeedRecord>> = records.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(records: &[FeedRecord]) -> Vec<&str> {
        records.iter().map(|r| r.external_id.as_str()).collect()
    }

    #[test]
    fn test_topological_order_parents_first() {
        let records = vec![
            FeedRecord::new("red-apple", [("en", "Red Apple")]).with_parent("apple"),
            FeedRecord::new("tomato", [("en", "Tomato")]),
            FeedRecord::new("apple", [("en", "Apple")]).with_parent("fruits"),
            FeedRecord::new("fruits", [("en", "Fruits")]),
        ];
        let ordered = topological_order(records).unwrap();
        assert_eq!(ids(&ordered), vec!["tomato", "fruits", "apple", "red-apple"]);
    }

    #[test]
    fn test_topological_order_ignores_external_parents() {
        let records = vec![FeedRecord::new("apple", [("en", "Apple")]).with_parent("fruits")];
        let ordered = topological_order(records).unwrap();
        assert_eq!(ids(&ordered), vec!["apple"]);
    }

    #[test]
    fn test_topological_order_reports_cycle() {
        let records = vec![
            FeedRecord::new("a", [("en", "A")]).with_parent("c"),
            FeedRecord::new("b", [("en", "B")]).with_parent("a"),
            FeedRecord::new("c", [("en", "C")]).with_parent("b"),
            FeedRecord::new("d", [("en", "D")]),
        ];
        let err = topological_order(records).unwrap_err();
        match err {
            ImportError::FeedCycle { ids } => assert_eq!(ids, vec!["a", "b", "c"]),
            other => panic!("expected FeedCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_precheck_rejections() {
        let records = vec![
            FeedRecord::new("apple", [("en", "Apple")]),
            FeedRecord::new("apple", [("en", "Apple again")]),
            FeedRecord::new("custom:1234", [("en", "Sneaky")]),
            FeedRecord::new("pear", Vec::<(String, String)>::new()),
            FeedRecord::new("loop", [("en", "Loop")]).with_parent("loop"),
            FeedRecord::new("plum", [("en", "Plum")]).with_parent("custom:abcd"),
        ];
        let mut failed = Vec::new();
        let accepted = precheck(records, &mut failed);

        assert_eq!(ids(&accepted), vec!["apple"]);
        let rejected: Vec<&str> = failed.iter().map(|f| f.external_id.as_str()).collect();
        assert_eq!(rejected, vec!["apple", "custom:1234", "pear", "loop", "plum"]);
    }

    #[test]
    fn test_report_helpers() {
        let report = ImportReport {
            created: 2,
            updated: 1,
            unchanged: 3,
            ..ImportReport::default()
        };
        assert_eq!(report.succeeded(), 6);
        assert!(report.is_clean());
    }
}
