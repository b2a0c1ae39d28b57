//! Taxonomy configuration
//!
//! `TaxonomyConfig` carries the handful of settings the taxonomy core needs:
//! where feeds may be imported from, which languages to fall back to, and the
//! query-shape limits. It can be built from defaults, environment variables or
//! a JSON file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Hard upper bound on search page size
pub const MAX_PAGE_SIZE: usize = 1000;

/// Shortest prefix that triggers a search
pub const MIN_PREFIX_LEN: usize = 2;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Settings for the taxonomy store, import pipeline and query service
///
/// All fields use `#[serde(default)]` so partial JSON files deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaxonomyConfig {
    /// Language searched when the requested language has no index entries
    pub default_language: String,

    /// Second choice for display names after the requested language
    pub fallback_language: String,

    /// Directory that import sources must resolve inside
    pub import_dir: PathBuf,

    /// Largest accepted search `limit`
    pub max_page_size: usize,

    /// Shortest normalised prefix that is searched
    pub min_prefix_len: usize,

    /// Capacity of the domain event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            fallback_language: "en".to_string(),
            import_dir: PathBuf::from("./data/taxonomy"),
            max_page_size: MAX_PAGE_SIZE,
            min_prefix_len: MIN_PREFIX_LEN,
            event_channel_capacity: 128,
        }
    }
}

impl TaxonomyConfig {
    /// Defaults with the given import directory
    pub fn with_import_dir(import_dir: impl Into<PathBuf>) -> Self {
        Self {
            import_dir: import_dir.into(),
            ..Self::default()
        }
    }

    /// Build from environment variables, falling back to defaults
    ///
    /// - `MISE_TAXONOMY_IMPORT_DIR`
    /// - `MISE_TAXONOMY_DEFAULT_LANGUAGE`
    /// - `MISE_TAXONOMY_FALLBACK_LANGUAGE`
    /// - `MISE_TAXONOMY_MAX_PAGE_SIZE`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("MISE_TAXONOMY_IMPORT_DIR") {
            config.import_dir = PathBuf::from(dir);
        }
        if let Ok(language) = std::env::var("MISE_TAXONOMY_DEFAULT_LANGUAGE") {
            config.default_language = language;
        }
        if let Ok(language) = std::env::var("MISE_TAXONOMY_FALLBACK_LANGUAGE") {
            config.fallback_language = language;
        }
        if let Ok(size) = std::env::var("MISE_TAXONOMY_MAX_PAGE_SIZE") {
            config.max_page_size = size.parse().map_err(|_| {
                ConfigError::Invalid(format!("MISE_TAXONOMY_MAX_PAGE_SIZE is not a number: {}", size))
            })?;
        }

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let mut config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_language.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_language cannot be empty".to_string(),
            ));
        }

        if self.fallback_language.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "fallback_language cannot be empty".to_string(),
            ));
        }

        if self.import_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("import_dir cannot be empty".to_string()));
        }

        if self.max_page_size == 0 || self.max_page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.min_prefix_len == 0 {
            return Err(ConfigError::Invalid(
                "min_prefix_len must be greater than 0".to_string(),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    fn normalize(&mut self) {
        self.default_language = crate::models::normalize_language(&self.default_language);
        self.fallback_language = crate::models::normalize_language(&self.fallback_language);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = TaxonomyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_page_size, 1000);
        assert_eq!(config.min_prefix_len, 2);
    }

    #[test]
    fn test_validate_rejects_oversized_page() {
        let config = TaxonomyConfig {
            max_page_size: 5000,
            ..TaxonomyConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_empty_language() {
        let config = TaxonomyConfig {
            default_language: "  ".to_string(),
            ..TaxonomyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"defaultLanguage": "FR", "importDir": "/srv/taxonomy"}}"#).unwrap();

        let config = TaxonomyConfig::load(file.path()).await.unwrap();
        assert_eq!(config.default_language, "fr");
        assert_eq!(config.fallback_language, "en");
        assert_eq!(config.import_dir, PathBuf::from("/srv/taxonomy"));
        assert_eq!(config.max_page_size, MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = TaxonomyConfig::load(file.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
