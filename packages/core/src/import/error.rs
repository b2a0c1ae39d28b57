//! Import Error Types
//!
//! Errors that abort a whole import run. Problems with individual records are
//! not errors at this level: they are collected into the `ImportReport`.

use std::path::PathBuf;
use thiserror::Error;

/// Import run errors
#[derive(Error, Debug)]
pub enum ImportError {
    /// The configured import directory is missing or unreadable
    #[error("Import directory {path} is not usable: {source}")]
    InvalidImportRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The requested source resolves outside the import directory
    #[error("Import source '{requested}' is outside the import directory")]
    OutsideImportRoot { requested: String },

    /// The requested source does not exist inside the import directory
    #[error("Import source '{requested}' not found")]
    SourceNotFound { requested: String },

    /// The file extension does not map to a known feed format
    #[error("Unsupported feed format for '{requested}'")]
    UnsupportedFormat { requested: String },

    /// Reading the feed failed
    #[error("Failed to read import source '{requested}': {source}")]
    Read {
        requested: String,
        source: std::io::Error,
    },

    /// The feed as a whole could not be parsed
    #[error("Failed to parse feed '{source_name}': {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// The feed's own parent references form a cycle; nothing was written
    #[error("Feed contains a parent cycle through: {}", ids.join(", "))]
    FeedCycle { ids: Vec<String> },
}

impl ImportError {
    /// Create an outside-import-root error
    pub fn outside_import_root(requested: impl Into<String>) -> Self {
        Self::OutsideImportRoot {
            requested: requested.into(),
        }
    }

    /// Create a parse error
    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}
