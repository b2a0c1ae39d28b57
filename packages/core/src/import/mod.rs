//! Feed Import
//!
//! Bulk loading of external taxonomy feeds into the `TaxonomyStore`:
//!
//! - `source` - the import directory boundary and the `FeedSource` trait
//! - `feed` - JSON and text feed parsing into `FeedRecord`s
//! - `pipeline` - ordering, batching and the `ImportReport`

mod error;
pub mod feed;
mod pipeline;
pub mod source;

pub use error::ImportError;
pub use feed::{parse_feed, slugify, FeedFormat, FeedRecord, ParsedFeed};
pub use pipeline::{ImportFailure, ImportPipeline, ImportReport};
pub use source::{FeedSource, FileFeedSource, ImportRoot, InlineFeedSource};
