//! Storage Layer
//!
//! This module holds the authoritative taxonomy graph:
//!
//! - `TaxonomyStore` - in-memory arena of nodes with id-based parent/child sets
//! - `StoreWriter` - exclusive write section for single mutations and batches
//! - `TaxonomyEvent` - domain events broadcast after each commit
//!
//! The store knows nothing about search or feed formats. The search index and
//! import pipeline are built on top of it.

mod error;
pub mod events;
mod taxonomy_store;

pub use error::StoreError;
pub use events::TaxonomyEvent;
pub use taxonomy_store::{
    StoreWriter, TaxonomyStore, UpsertOutcome, DOMAIN_EVENT_CHANNEL_CAPACITY,
};
