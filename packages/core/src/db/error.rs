//! Store Error Types
//!
//! This module defines error types for taxonomy store mutations and lookups.
//! Structural violations are rejected before any state changes and are never
//! silently repaired.

use crate::models::ValidationError;
use thiserror::Error;

/// Taxonomy store errors
///
/// Every variant carries the offending id so failures are actionable without
/// exposing how nodes are laid out internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Node not found by id
    #[error("Node not found: {id}")]
    NotFound { id: String },

    /// Node-local or structural validation failed (empty names, cycle, ...)
    #[error("Node validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// An edge points at a node that does not exist
    #[error("Node {node_id} references missing node {missing_id}")]
    DanglingReference { node_id: String, missing_id: String },
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a dangling reference error
    pub fn dangling_reference(node_id: impl Into<String>, missing_id: impl Into<String>) -> Self {
        Self::DanglingReference {
            node_id: node_id.into(),
            missing_id: missing_id.into(),
        }
    }

    /// Create a cycle error
    pub fn cycle_detected(node_id: impl Into<String>, via: impl Into<String>) -> Self {
        Self::Validation(ValidationError::CycleDetected {
            node_id: node_id.into(),
            via: via.into(),
        })
    }

    /// True for cycle, dangling-reference and empty-names failures
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DanglingReference { .. }
                | Self::Validation(ValidationError::CycleDetected { .. })
                | Self::Validation(ValidationError::EmptyNames { .. })
                | Self::Validation(ValidationError::SelfReference { .. })
        )
    }
}
