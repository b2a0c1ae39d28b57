//! Import sources
//!
//! `ImportRoot` confines file imports to one configured directory. A requested
//! source is resolved and checked twice (lexically, then after symlink
//! resolution) before a single byte is read from it.

use super::error::ImportError;
use super::feed::FeedFormat;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// The directory every file import must resolve inside
#[derive(Debug, Clone)]
pub struct ImportRoot {
    root: PathBuf,
}

impl ImportRoot {
    /// Canonicalise and open an import directory
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self, ImportError> {
        let dir = dir.as_ref();
        let root = tokio::fs::canonicalize(dir)
            .await
            .map_err(|source| ImportError::InvalidImportRoot {
                path: dir.to_path_buf(),
                source,
            })?;

        let metadata = tokio::fs::metadata(&root)
            .await
            .map_err(|source| ImportError::InvalidImportRoot {
                path: dir.to_path_buf(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(ImportError::InvalidImportRoot {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
            });
        }

        Ok(Self { root })
    }

    /// Canonical path of the import directory
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a requested source to a canonical path inside the root
    ///
    /// Relative paths are taken relative to the root. Anything that escapes
    /// the root (`..` segments, absolute paths elsewhere, symlinks pointing
    /// out) is `OutsideImportRoot`; the error carries only the requested text.
    pub async fn resolve(&self, requested: &str) -> Result<PathBuf, ImportError> {
        let requested_path = Path::new(requested);
        let joined = if requested_path.is_absolute() {
            requested_path.to_path_buf()
        } else {
            self.root.join(requested_path)
        };

        let lexical = normalize_lexically(&joined);
        if !self.is_inside(&lexical) {
            tracing::warn!("Refused import source outside the import directory: {}", requested);
            return Err(ImportError::outside_import_root(requested));
        }

        let resolved = tokio::fs::canonicalize(&lexical).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ImportError::SourceNotFound {
                    requested: requested.to_string(),
                }
            } else {
                ImportError::Read {
                    requested: requested.to_string(),
                    source: e,
                }
            }
        })?;
        if !self.is_inside(&resolved) {
            tracing::warn!("Refused import source resolving outside the import directory: {}", requested);
            return Err(ImportError::outside_import_root(requested));
        }

        Ok(resolved)
    }

    /// Strict descendant check, component-wise
    fn is_inside(&self, path: &Path) -> bool {
        path != self.root && path.starts_with(&self.root)
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Somewhere a feed document can be loaded from
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Name used in reports and logs
    fn name(&self) -> String;

    /// Format of the document
    fn format(&self) -> FeedFormat;

    /// Load the whole document
    async fn load(&self) -> Result<String, ImportError>;
}

/// A feed file inside the import directory
#[derive(Debug, Clone)]
pub struct FileFeedSource {
    requested: String,
    path: PathBuf,
    format: FeedFormat,
}

impl FileFeedSource {
    /// Resolve `requested` against the root and detect its format
    pub async fn open(root: &ImportRoot, requested: &str) -> Result<Self, ImportError> {
        let path = root.resolve(requested).await?;
        let format = FeedFormat::from_path(&path).ok_or_else(|| ImportError::UnsupportedFormat {
            requested: requested.to_string(),
        })?;
        Ok(Self {
            requested: requested.to_string(),
            path,
            format,
        })
    }

    /// Canonical path of the feed file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FeedSource for FileFeedSource {
    fn name(&self) -> String {
        self.requested.clone()
    }

    fn format(&self) -> FeedFormat {
        self.format
    }

    async fn load(&self) -> Result<String, ImportError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ImportError::Read {
                requested: self.requested.clone(),
                source,
            })
    }
}

/// A feed document held in memory, e.g. a bulk paste from the admin screen
#[derive(Debug, Clone)]
pub struct InlineFeedSource {
    name: String,
    format: FeedFormat,
    content: String,
}

impl InlineFeedSource {
    pub fn new(name: impl Into<String>, format: FeedFormat, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format,
            content: content.into(),
        }
    }
}

#[async_trait]
impl FeedSource for InlineFeedSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn format(&self) -> FeedFormat {
        self.format
    }

    async fn load(&self) -> Result<String, ImportError> {
        Ok(self.content.clone())
    }
}
