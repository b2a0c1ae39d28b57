//! Mise Ingredient Taxonomy Core
//!
//! This crate holds the multilingual ingredient taxonomy behind recipe
//! linking and ingredient autocomplete: a DAG of ingredient categories with
//! names per language, refreshed in bulk from external feeds and extended by
//! administrators with custom entries.
//!
//! # Architecture
//!
//! - **Arena store**: nodes live in an id-keyed map; parent/child edges are
//!   id sets kept symmetric by the store, never object references
//! - **Checked mutations**: every upsert/delete validates names, dangling
//!   references and cycles before anything is committed
//! - **Derived search index**: per-language sorted prefix maps rebuilt from the
//!   store and published by atomic swap
//! - **Batch import**: feeds are parsed outside any lock, ordered parents-first
//!   and written under one write section
//!
//! # Modules
//!
//! - [`models`] - `TaxonomyNode`, dietary flags, summaries
//! - [`db`] - `TaxonomyStore`, write sections and domain events
//! - [`import`] - feed parsing, import directory boundary, `ImportPipeline`
//! - [`search`] - `SearchIndex` prefix search
//! - [`services`] - `QueryService` facade
//! - [`config`] - `TaxonomyConfig`

pub mod config;
pub mod db;
pub mod import;
pub mod models;
pub mod search;
pub mod services;

// Re-export commonly used types
pub use config::TaxonomyConfig;
pub use db::{StoreError, TaxonomyEvent, TaxonomyStore, UpsertOutcome};
pub use import::{ImportError, ImportPipeline, ImportReport};
pub use models::*;
pub use search::SearchIndex;
pub use services::*;
