//! Autocomplete Search
//!
//! A derived, per-language prefix index built from `TaxonomyStore` contents:
//!
//! - `SearchIndex` - rebuild, incremental apply and paged prefix search
//! - `normalize` - the trim + lower-case rule shared by keys and queries

mod index;
pub mod normalize;

pub use index::{IndexStats, SearchHit, SearchHits, SearchIndex};
pub use normalize::normalize_text;
