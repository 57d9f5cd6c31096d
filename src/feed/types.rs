use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::truncate_title;

/// A single post in canonical form.
///
/// `title` never exceeds the configured title cap, `link` is an absolute URL,
/// and `summary` is plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub title: String,
    pub link: String,
    pub summary: String,
}

impl NormalizedItem {
    /// Builds an item, capping `title` at `title_cap` characters.
    ///
    /// An empty title falls back to the summary.
    pub fn new(title: &str, link: String, summary: String, title_cap: usize) -> Self {
        let source = if title.is_empty() { &summary } else { title };
        let title = truncate_title(source, title_cap).into_owned();
        Self {
            title,
            link,
            summary,
        }
    }
}

/// An ordered set of items plus feed-level header fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    pub updated: DateTime<Utc>,
    pub items: Vec<NormalizedItem>,
}

impl FeedDocument {
    /// Creates a document stamped with the current time.
    pub fn new(title: impl Into<String>, items: Vec<NormalizedItem>) -> Self {
        Self {
            title: title.into(),
            updated: Utc::now(),
            items,
        }
    }
}

/// Per-key bookkeeping written alongside every stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMetadata {
    pub query: String,
    pub updated_at: DateTime<Utc>,
}

/// A configured `(feed key, search query)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedQuery {
    pub key: String,
    pub query: String,
}
