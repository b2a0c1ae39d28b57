//! Feed parsing
//!
//! Turns raw feed text into `FeedRecord`s. Two formats are understood:
//!
//! - **JSON**: `{ "entries": [ { "id", "names", "parents", "vegan", "vegetarian", "refs" } ] }`
//! - **Text**: blank-line separated blocks in the line-oriented taxonomy dump
//!   format:
//!
//! ```text
//! # Fruits
//! en:Apple, Apples
//! fr:Pomme
//! < en:Fruits
//! vegan:en:yes
//! wikidata:en:Q89
//! ```
//!
//! A document that cannot be read at all is an `ImportError::Parse`. A single
//! malformed entry or block is reported in `ParsedFeed::rejected` and the rest
//! of the feed is still imported.

use super::error::ImportError;
use super::pipeline::ImportFailure;
use crate::models::{normalize_language, DietaryFlag, DietaryFlags};
use crate::search::normalize_text;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;

/// Supported feed formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Json,
    Text,
}

impl FeedFormat {
    /// Pick the format from a file extension (`.json`, `.txt`)
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(Self::Json),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

/// One taxonomy entry as read from a feed, before it touches the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    /// Feed-assigned id, used verbatim as the canonical id
    pub external_id: String,
    pub names: BTreeMap<String, String>,
    /// Parent ids in feed order
    pub parents: Vec<String>,
    pub dietary_flags: DietaryFlags,
    pub external_refs: BTreeMap<String, String>,
}

impl FeedRecord {
    /// Create a record with names only
    pub fn new<I, L, N>(external_id: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = (L, N)>,
        L: AsRef<str>,
        N: Into<String>,
    {
        Self {
            external_id: external_id.into(),
            names: names
                .into_iter()
                .map(|(lang, name)| (normalize_language(lang.as_ref()), name.into()))
                .collect(),
            parents: Vec::new(),
            dietary_flags: DietaryFlags::default(),
            external_refs: BTreeMap::new(),
        }
    }

    /// Builder: add a parent reference
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parents.push(parent_id.into());
        self
    }

    /// Builder: set dietary flags
    pub fn with_dietary_flags(mut self, flags: DietaryFlags) -> Self {
        self.dietary_flags = flags;
        self
    }
}

/// Result of parsing one feed document
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub records: Vec<FeedRecord>,
    /// Entries that could not be turned into records
    pub rejected: Vec<ImportFailure>,
}

/// Parse a feed document in the given format
pub fn parse_feed(content: &str, format: FeedFormat, source_name: &str) -> Result<ParsedFeed, ImportError> {
    match format {
        FeedFormat::Json => parse_json_feed(content, source_name),
        FeedFormat::Text => Ok(parse_text_feed(content)),
    }
}

#[derive(Deserialize)]
struct JsonFeed {
    entries: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct JsonFeedEntry {
    id: String,
    names: BTreeMap<String, String>,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    vegan: Option<bool>,
    #[serde(default)]
    vegetarian: Option<bool>,
    #[serde(default)]
    refs: BTreeMap<String, String>,
}

/// Parse a JSON feed; entries are decoded one at a time so a bad entry only
/// rejects itself
pub fn parse_json_feed(content: &str, source_name: &str) -> Result<ParsedFeed, ImportError> {
    let feed: JsonFeed =
        serde_json::from_str(content).map_err(|e| ImportError::parse(source_name, e.to_string()))?;

    let mut parsed = ParsedFeed::default();
    for (position, value) in feed.entries.into_iter().enumerate() {
        let label = value
            .get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("entry #{}", position + 1));

        match serde_json::from_value::<JsonFeedEntry>(value) {
            Ok(entry) => parsed.records.push(FeedRecord {
                external_id: entry.id,
                names: entry.names,
                parents: entry.parents,
                dietary_flags: DietaryFlags {
                    vegan: entry.vegan.into(),
                    vegetarian: entry.vegetarian.into(),
                },
                external_refs: entry.refs,
            }),
            Err(e) => parsed.rejected.push(ImportFailure::new(label, e.to_string())),
        }
    }

    Ok(parsed)
}

fn name_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([a-zA-Z]{2,3}(?:[_-][a-zA-Z]{2,4})?):\s*(.+)$").expect("valid name line regex")
    })
}

fn parent_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^<\s*(?:([a-zA-Z]{2,3}(?:[_-][a-zA-Z]{2,4})?):)?\s*(.+)$")
            .expect("valid parent line regex")
    })
}

fn property_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([a-z][a-z0-9_]{3,}):([a-zA-Z]{2,3}(?:[_-][a-zA-Z]{2,4})?):\s*(.+)$")
            .expect("valid property line regex")
    })
}

/// Parse a text taxonomy dump
///
/// Blocks starting with `synonyms:` or `stopwords:` are vocabulary blocks,
/// not entries, and are skipped. A parent line `< lang:Name` resolves to the
/// block that has `Name` in that language, wherever the block appears in the
/// dump; names not found in the dump fall back to `slugify(Name)`.
pub fn parse_text_feed(content: &str) -> ParsedFeed {
    let mut parsed = ParsedFeed::default();
    let mut blocks = Vec::new();
    let mut block: Vec<(usize, &str)> = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.starts_with('#') {
            continue;
        }
        if line.is_empty() {
            flush_block(&mut block, &mut blocks, &mut parsed.rejected);
            continue;
        }
        block.push((index + 1, line));
    }
    flush_block(&mut block, &mut blocks, &mut parsed.rejected);

    let names = NameLookup::build(&blocks);
    parsed.records = blocks
        .into_iter()
        .map(|block| {
            let mut record = block.record;
            record.parents = block.parent_refs.iter().map(|r| names.resolve(r)).collect();
            record
        })
        .collect();

    parsed
}

/// A `<` line before it is resolved to an id
#[derive(Debug)]
struct ParentRef {
    language: Option<String>,
    name: String,
}

/// A parsed block whose parent lines are still names
#[derive(Debug)]
struct TextBlock {
    record: FeedRecord,
    parent_refs: Vec<ParentRef>,
}

/// Name to id lookup over every block of one dump
#[derive(Default)]
struct NameLookup {
    by_language: HashMap<(String, String), String>,
    any_language: HashMap<String, String>,
}

impl NameLookup {
    fn build(blocks: &[TextBlock]) -> Self {
        let mut lookup = Self::default();
        for block in blocks {
            let id = &block.record.external_id;
            for (language, name) in &block.record.names {
                let key = normalize_text(name);
                lookup
                    .by_language
                    .entry((language.clone(), key.clone()))
                    .or_insert_with(|| id.clone());
                lookup.any_language.entry(key).or_insert_with(|| id.clone());
            }
        }
        lookup
    }

    fn resolve(&self, parent: &ParentRef) -> String {
        let key = normalize_text(&parent.name);
        let found = match &parent.language {
            Some(language) => self.by_language.get(&(language.clone(), key)),
            None => self.any_language.get(&key),
        };
        found.cloned().unwrap_or_else(|| slugify(&parent.name))
    }
}

fn flush_block(
    block: &mut Vec<(usize, &str)>,
    blocks: &mut Vec<TextBlock>,
    rejected: &mut Vec<ImportFailure>,
) {
    if block.is_empty() {
        return;
    }
    let first_line = block[0].0;
    match parse_block(block) {
        Ok(Some(parsed)) => blocks.push(parsed),
        Ok(None) => {}
        Err((label, reason)) => {
            let label = label.unwrap_or_else(|| format!("block at line {}", first_line));
            rejected.push(ImportFailure::new(label, reason));
        }
    }
    block.clear();
}

type BlockError = (Option<String>, String);

fn parse_block(block: &[(usize, &str)]) -> Result<Option<TextBlock>, BlockError> {
    if let Some((_, first)) = block.first() {
        if first.starts_with("synonyms:") || first.starts_with("stopwords:") {
            return Ok(None);
        }
    }

    let mut explicit_id: Option<String> = None;
    let mut first_name: Option<String> = None;
    let mut names = BTreeMap::new();
    let mut parent_refs = Vec::new();
    let mut flags = DietaryFlags::default();
    let mut refs = BTreeMap::new();
    let mut errors = Vec::new();

    for &(number, line) in block {
        if let Some(id) = line.strip_prefix("id:") {
            explicit_id = Some(id.trim().to_string());
        } else if let Some(caps) = parent_line().captures(line) {
            let name = caps[2].trim();
            if slugify(name).is_empty() {
                errors.push(format!("line {}: empty parent reference", number));
            } else {
                parent_refs.push(ParentRef {
                    language: caps.get(1).map(|m| normalize_language(m.as_str())),
                    name: name.to_string(),
                });
            }
        } else if let Some(caps) = property_line().captures(line) {
            let key = &caps[1];
            let value = caps[3].trim();
            match key {
                "vegan" | "vegetarian" => {
                    let flag = DietaryFlag::parse(value).ok_or_else(|| {
                        format!("line {}: unrecognised {} value '{}'", number, key, value)
                    });
                    match flag {
                        Ok(flag) if key == "vegan" => flags.vegan = flag,
                        Ok(flag) => flags.vegetarian = flag,
                        Err(e) => errors.push(e),
                    }
                }
                _ => {
                    refs.insert(key.to_string(), value.to_string());
                }
            }
        } else if let Some(caps) = name_line().captures(line) {
            let language = normalize_language(&caps[1]);
            let display = caps[2].split(',').next().unwrap_or("").trim().to_string();
            if display.is_empty() {
                errors.push(format!("line {}: empty name for language '{}'", number, language));
                continue;
            }
            if first_name.is_none() {
                first_name = Some(display.clone());
            }
            if names.insert(language.clone(), display).is_some() {
                errors.push(format!("line {}: duplicate names for language '{}'", number, language));
            }
        } else {
            errors.push(format!("line {}: unrecognised line '{}'", number, line));
        }
    }

    let id = explicit_id
        .filter(|id| !id.is_empty())
        .or_else(|| first_name.as_deref().map(slugify))
        .filter(|id| !id.is_empty());

    if !errors.is_empty() {
        return Err((id, errors.join("; ")));
    }
    let id = id.ok_or_else(|| (None, "block has no names and no id".to_string()))?;

    Ok(Some(TextBlock {
        record: FeedRecord {
            external_id: id,
            names,
            parents: Vec::new(),
            dietary_flags: flags,
            external_refs: refs,
        },
        parent_refs,
    }))
}

/// Derive an id from a display name: lower-cased, runs of anything that is
/// not a letter or digit collapse to a single `-`
///
/// ```rust
/// # use mise_taxonomy::import::slugify;
/// assert_eq!(slugify("Red Apple"), "red-apple");
/// assert_eq!(slugify("  Crème fraîche (30%) "), "crème-fraîche-30");
/// ```
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRUIT_DUMP: &str = "\
# Basic fruit tree
synonyms:en:apple, pomme

en:Fruits
fr:Fruits

en:Apple, Apples
fr:Pomme
< en:Fruits
vegan:en:yes
wikidata:en:Q89

en:Red Apple
fr:Pomme rouge
< en:Apple
";

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Red Apple"), "red-apple");
        assert_eq!(slugify("  --Olive oil--  "), "olive-oil");
        assert_eq!(slugify("Épices"), "épices");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(FeedFormat::from_path(Path::new("a/b.json")), Some(FeedFormat::Json));
        assert_eq!(FeedFormat::from_path(Path::new("b.TXT")), Some(FeedFormat::Text));
        assert_eq!(FeedFormat::from_path(Path::new("b.csv")), None);
        assert_eq!(FeedFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_text_feed_blocks() {
        let parsed = parse_text_feed(FRUIT_DUMP);
        assert!(parsed.rejected.is_empty(), "{:?}", parsed.rejected);
        assert_eq!(parsed.records.len(), 3);

        let apple = &parsed.records[1];
        assert_eq!(apple.external_id, "apple");
        assert_eq!(apple.names.get("en").map(String::as_str), Some("Apple"));
        assert_eq!(apple.names.get("fr").map(String::as_str), Some("Pomme"));
        assert_eq!(apple.parents, vec!["fruits".to_string()]);
        assert_eq!(apple.dietary_flags.vegan, DietaryFlag::Yes);
        assert_eq!(apple.dietary_flags.vegetarian, DietaryFlag::Unknown);
        assert_eq!(apple.external_refs.get("wikidata").map(String::as_str), Some("Q89"));

        assert_eq!(parsed.records[2].external_id, "red-apple");
        assert_eq!(parsed.records[2].parents, vec!["apple".to_string()]);
    }

    #[test]
    fn test_text_feed_parent_resolves_by_language() {
        let dump = "fr:Légumes\nen:Vegetables\n\nen:Carrot\n< en:Vegetables\n\nen:Leek\n< fr:légumes\n\nen:Parsnip\n< Vegetables\n";
        let parsed = parse_text_feed(dump);
        assert!(parsed.rejected.is_empty(), "{:?}", parsed.rejected);

        let ids: Vec<&str> = parsed.records.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["légumes", "carrot", "leek", "parsnip"]);
        for record in &parsed.records[1..] {
            assert_eq!(record.parents, vec!["légumes".to_string()]);
        }
    }

    #[test]
    fn test_text_feed_parent_defined_later_or_elsewhere() {
        let dump = "en:Red Apple\n< en:Apple\n\nid:malus\nen:Apple\n< en:Fruits\n";
        let parsed = parse_text_feed(dump);

        // Forward reference resolves to the explicit id; unknown names are slugged
        assert_eq!(parsed.records[0].parents, vec!["malus".to_string()]);
        assert_eq!(parsed.records[1].parents, vec!["fruits".to_string()]);
    }

    #[test]
    fn test_text_feed_explicit_id() {
        let parsed = parse_text_feed("id:malus-domestica\nen:Apple\n");
        assert_eq!(parsed.records[0].external_id, "malus-domestica");
    }

    #[test]
    fn test_text_feed_rejects_malformed_block_only() {
        let dump = "en:Tomato\n\nen:Basil\nvegan:en:perhaps\n\nen:Thyme\nthis is not a line\n";
        let parsed = parse_text_feed(dump);

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].external_id, "tomato");
        assert_eq!(parsed.rejected.len(), 2);
        assert_eq!(parsed.rejected[0].external_id, "basil");
        assert!(parsed.rejected[0].reason.contains("perhaps"));
        assert_eq!(parsed.rejected[1].external_id, "thyme");
    }

    #[test]
    fn test_text_feed_duplicate_language() {
        let parsed = parse_text_feed("en:Leek\nen:Leeks\n");
        assert!(parsed.records.is_empty());
        assert!(parsed.rejected[0].reason.contains("duplicate"));
    }

    #[test]
    fn test_json_feed() {
        let json = r#"{"entries": [
            {"id": "fruits", "names": {"en": "Fruits"}},
            {"id": "apple", "names": {"en": "Apple", "fr": "Pomme"}, "parents": ["fruits"],
             "vegan": true, "vegetarian": null, "refs": {"wikidata": "Q89"}}
        ]}"#;
        let parsed = parse_json_feed(json, "fruits.json").unwrap();

        assert_eq!(parsed.records.len(), 2);
        let apple = &parsed.records[1];
        assert_eq!(apple.parents, vec!["fruits".to_string()]);
        assert_eq!(apple.dietary_flags.vegan, DietaryFlag::Yes);
        assert_eq!(apple.dietary_flags.vegetarian, DietaryFlag::Unknown);
        assert_eq!(apple.external_refs.len(), 1);
    }

    #[test]
    fn test_json_feed_bad_entry_is_rejected_individually() {
        let json = r#"{"entries": [
            {"id": "fruits", "names": {"en": "Fruits"}},
            {"id": "apple", "names": "Apple"},
            {"names": {"en": "Nameless"}}
        ]}"#;
        let parsed = parse_json_feed(json, "fruits.json").unwrap();

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.rejected.len(), 2);
        assert_eq!(parsed.rejected[0].external_id, "apple");
        assert_eq!(parsed.rejected[1].external_id, "entry #3");
    }

    #[test]
    fn test_json_feed_unreadable_document() {
        let err = parse_json_feed("[1, 2", "broken.json").unwrap_err();
        assert!(matches!(err, ImportError::Parse { .. }));
    }
}
