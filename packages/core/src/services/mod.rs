//! Business Services
//!
//! - `QueryService` - the public facade: search, lookups, edge expansion,
//!   statistics and the admin mutation surface
//!
//! Services coordinate the store, the search index and the import pipeline and
//! enforce the caller-facing contracts (page sizes, language fallback).

pub mod error;
pub mod query_service;

pub use error::QueryServiceError;
pub use query_service::{NodeDetail, QueryService, SearchPage, TaxonomyStats};
