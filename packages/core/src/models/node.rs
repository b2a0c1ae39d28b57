//! Taxonomy Node Data Structures
//!
//! This module defines the `TaxonomyNode` struct, the unit of identity in the
//! ingredient taxonomy, together with its dietary flags and the lightweight
//! `NodeSummary` handed to callers.
//!
//! # Architecture
//!
//! - **Stable ids**: `canonical_id` never changes once a node exists
//! - **Multilingual names**: one display string per language code
//! - **Id-based adjacency**: parents and children are sets of canonical ids,
//!   resolved through the store rather than held as references
//! - **Closed field set**: anything not modelled directly goes into `external_refs`
//!
//! # Examples
//!
//! ```rust
//! use mise_taxonomy::models::TaxonomyNode;
//!
//! let fruits = TaxonomyNode::new("fruits", [("en", "Fruits"), ("fr", "Fruits")]);
//! let apple = TaxonomyNode::new("apple", [("en", "Apple"), ("fr", "Pomme")])
//!     .with_parent("fruits");
//!
//! assert_eq!(apple.name_in("fr"), Some("Pomme"));
//! assert!(apple.parent_ids.contains(&fruits.canonical_id));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use uuid::Uuid;

/// Prefix reserved for administrator-minted node ids
///
/// Feed-sourced ids must never start with this prefix so the two id spaces
/// cannot collide.
pub const CUSTOM_ID_PREFIX: &str = "custom:";

/// Validation errors for taxonomy nodes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Node id must not be empty")]
    EmptyId,

    #[error("Node {id} has no names")]
    EmptyNames { id: String },

    #[error("Node {id} has an empty language code")]
    InvalidLanguage { id: String },

    #[error("Node {id} has a blank name for language '{language}'")]
    EmptyName { id: String, language: String },

    #[error("Node {id} has more than one name for language '{language}'")]
    DuplicateLanguage { id: String, language: String },

    #[error("Node {id} references itself")]
    SelfReference { id: String },

    #[error("Cycle detected: node {node_id} would become its own ancestor via {via}")]
    CycleDetected { node_id: String, via: String },

    #[error("Id {id} uses the reserved custom id prefix")]
    ReservedId { id: String },
}

/// Tri-state dietary flag
///
/// `Unknown` is the default: most feed entries say nothing about a given diet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DietaryFlag {
    #[default]
    Unknown,
    Yes,
    No,
}

impl DietaryFlag {
    /// Parse a loosely-written flag value ("yes", "no", "maybe", "true", ...)
    ///
    /// Returns `None` for values that are not recognised at all.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "yes" | "true" | "y" | "1" => Some(Self::Yes),
            "no" | "false" | "n" | "0" => Some(Self::No),
            "maybe" | "unknown" | "" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Tri-state view as an optional boolean
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Yes => Some(true),
            Self::No => Some(false),
        }
    }
}

impl From<Option<bool>> for DietaryFlag {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Unknown,
            Some(true) => Self::Yes,
            Some(false) => Self::No,
        }
    }
}

/// Dietary flags stored per node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DietaryFlags {
    #[serde(default)]
    pub vegan: DietaryFlag,
    #[serde(default)]
    pub vegetarian: DietaryFlag,
}

/// A node of the ingredient taxonomy.
///
/// # Fields
///
/// - `canonical_id`: globally unique, stable id (feed id, or `custom:<uuid>`)
/// - `names`: language code → display string, never empty
/// - `parent_ids` / `child_ids`: symmetric adjacency, kept consistent by the store
/// - `dietary_flags`: tri-state vegan / vegetarian flags
/// - `is_custom`: true for administrator-entered nodes, which feed refreshes never touch
/// - `external_refs`: reference system → value (e.g. `wikidata` → `Q89`)
/// - `created_at` / `updated_at`: timestamps maintained by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyNode {
    /// Stable identifier, immutable once created
    pub canonical_id: String,

    /// Display names keyed by lower-case language code
    pub names: BTreeMap<String, String>,

    /// Ids of direct parents
    #[serde(default)]
    pub parent_ids: BTreeSet<String>,

    /// Ids of direct children
    #[serde(default)]
    pub child_ids: BTreeSet<String>,

    #[serde(default)]
    pub dietary_flags: DietaryFlags,

    /// Administrator-entered node (not sourced from the import feed)
    #[serde(default)]
    pub is_custom: bool,

    /// Informational references into other knowledge bases
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub external_refs: BTreeMap<String, String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl TaxonomyNode {
    /// Create a feed-style node with the given id and names
    ///
    /// Language codes are normalised (trimmed, lower-cased) the same way the
    /// store validates them.
    pub fn new<I, L, N>(canonical_id: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = (L, N)>,
        L: AsRef<str>,
        N: Into<String>,
    {
        let now = Utc::now();
        Self {
            canonical_id: canonical_id.into(),
            names: names
                .into_iter()
                .map(|(lang, name)| (normalize_language(lang.as_ref()), name.into()))
                .collect(),
            parent_ids: BTreeSet::new(),
            child_ids: BTreeSet::new(),
            dietary_flags: DietaryFlags::default(),
            is_custom: false,
            external_refs: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an administrator-entered node with a freshly minted id
    ///
    /// ```rust
    /// # use mise_taxonomy::models::{TaxonomyNode, CUSTOM_ID_PREFIX};
    /// let node = TaxonomyNode::new_custom([("en", "Grandma's spice mix")]);
    /// assert!(node.is_custom);
    /// assert!(node.canonical_id.starts_with(CUSTOM_ID_PREFIX));
    /// ```
    pub fn new_custom<I, L, N>(names: I) -> Self
    where
        I: IntoIterator<Item = (L, N)>,
        L: AsRef<str>,
        N: Into<String>,
    {
        let mut node = Self::new(mint_custom_id(), names);
        node.is_custom = true;
        node
    }

    /// Builder: add a parent reference
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_ids.insert(parent_id.into());
        self
    }

    /// Builder: add a child reference
    pub fn with_child(mut self, child_id: impl Into<String>) -> Self {
        self.child_ids.insert(child_id.into());
        self
    }

    /// Builder: set dietary flags
    pub fn with_dietary_flags(mut self, flags: DietaryFlags) -> Self {
        self.dietary_flags = flags;
        self
    }

    /// Builder: add an external reference
    pub fn with_external_ref(mut self, system: impl Into<String>, value: impl Into<String>) -> Self {
        self.external_refs.insert(system.into(), value.into());
        self
    }

    /// Name in exactly this language, if present
    pub fn name_in(&self, language: &str) -> Option<&str> {
        self.names
            .get(&normalize_language(language))
            .map(String::as_str)
    }

    /// Resolve a display name: requested language, then fallback language,
    /// then the canonical id itself.
    pub fn display_name(&self, language: &str, fallback_language: &str) -> &str {
        self.name_in(language)
            .or_else(|| self.name_in(fallback_language))
            .unwrap_or(&self.canonical_id)
    }

    /// True when the node has no parents
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// Compare everything except timestamps
    ///
    /// Used to turn a re-upsert of identical content into a no-op.
    pub fn same_content(&self, other: &TaxonomyNode) -> bool {
        self.canonical_id == other.canonical_id
            && self.names == other.names
            && self.parent_ids == other.parent_ids
            && self.child_ids == other.child_ids
            && self.dietary_flags == other.dietary_flags
            && self.is_custom == other.is_custom
            && self.external_refs == other.external_refs
    }

    /// Re-key `names` by normalised language code and trim display strings
    ///
    /// Two keys that collapse to the same language (`"FR"` and `"fr"`) are
    /// rejected rather than merged.
    pub fn normalize_names(&mut self) -> Result<(), ValidationError> {
        let mut normalized = BTreeMap::new();
        for (language, name) in std::mem::take(&mut self.names) {
            let language = normalize_language(&language);
            if normalized.contains_key(&language) {
                return Err(ValidationError::DuplicateLanguage {
                    id: self.canonical_id.clone(),
                    language,
                });
            }
            normalized.insert(language, name.trim().to_string());
        }
        self.names = normalized;
        Ok(())
    }

    /// Check the node-local invariants (id, names, self reference)
    ///
    /// Graph-level invariants (dangling references, cycles) need the store and
    /// are checked there.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.canonical_id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }

        if !self.is_custom && is_custom_id(&self.canonical_id) {
            return Err(ValidationError::ReservedId {
                id: self.canonical_id.clone(),
            });
        }

        if self.names.is_empty() {
            return Err(ValidationError::EmptyNames {
                id: self.canonical_id.clone(),
            });
        }

        for (language, name) in &self.names {
            if language.trim().is_empty() {
                return Err(ValidationError::InvalidLanguage {
                    id: self.canonical_id.clone(),
                });
            }
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyName {
                    id: self.canonical_id.clone(),
                    language: language.clone(),
                });
            }
        }

        if self.parent_ids.contains(&self.canonical_id) || self.child_ids.contains(&self.canonical_id)
        {
            return Err(ValidationError::SelfReference {
                id: self.canonical_id.clone(),
            });
        }

        Ok(())
    }

    /// Build the caller-facing summary for a language
    pub fn summary(&self, language: &str, fallback_language: &str) -> NodeSummary {
        NodeSummary {
            id: self.canonical_id.clone(),
            display_name: self.display_name(language, fallback_language).to_string(),
            is_custom: self.is_custom,
            dietary_flags: self.dietary_flags,
        }
    }
}

/// Compact view of a node returned by searches and edge listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub id: String,
    pub display_name: String,
    pub is_custom: bool,
    pub dietary_flags: DietaryFlags,
}

/// Normalise a language code: trimmed and lower-cased
pub fn normalize_language(language: &str) -> String {
    language.trim().to_lowercase()
}

/// Mint a new custom node id (`custom:<uuid-v4>`)
pub fn mint_custom_id() -> String {
    format!("{}{}", CUSTOM_ID_PREFIX, Uuid::new_v4())
}

/// True when the id lives in the administrator id space
pub fn is_custom_id(id: &str) -> bool {
    id.starts_with(CUSTOM_ID_PREFIX)
}
