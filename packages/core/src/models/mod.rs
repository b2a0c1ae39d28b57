//! Data Models
//!
//! This module contains the core data structures of the ingredient taxonomy:
//!
//! - `TaxonomyNode` - A multilingual ingredient or category node with id-based edges
//! - `DietaryFlags` - Tri-state vegan / vegetarian markers
//! - `NodeSummary` - The compact shape returned by searches and edge listings

mod node;

pub use node::{
    is_custom_id, mint_custom_id, normalize_language, DietaryFlag, DietaryFlags, NodeSummary,
    TaxonomyNode, ValidationError, CUSTOM_ID_PREFIX,
};
