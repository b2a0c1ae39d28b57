//! Service Layer Error Types
//!
//! Errors returned by the `QueryService` facade. Store and import failures are
//! chained through unchanged so callers can still match on the root cause.

use crate::db::StoreError;
use crate::import::ImportError;
use crate::models::ValidationError;
use thiserror::Error;

/// Query service errors
#[derive(Error, Debug)]
pub enum QueryServiceError {
    /// A caller-supplied argument is out of range (page size, offsets)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Store lookup or mutation failed
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    /// Import run failed as a whole
    #[error("Import failed: {0}")]
    Import(#[from] ImportError),
}

impl QueryServiceError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// True when the error means the requested node does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound { .. }))
    }
}

impl From<ValidationError> for QueryServiceError {
    fn from(err: ValidationError) -> Self {
        Self::Store(StoreError::Validation(err))
    }
}
