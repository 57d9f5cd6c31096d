//! Read side: resolve a request path to a stored feed in the requested format.
//!
//! `<name>.xml` serves the stored Atom document verbatim. `<name>.json`
//! decodes the document stored under `<name>.xml` into a JSON array of
//! `{title, link, summary}` objects.
use thiserror::Error;

use crate::feed::{decode, NormalizedItem};
use crate::storage::FeedStore;

pub const ATOM_CONTENT_TYPE: &str = "application/atom+xml; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Error)]
pub enum ReadError {
    /// Nothing has ever been stored under this key
    #[error("missing: {0}")]
    NotFound(String),
    /// Path has neither a `.xml` nor a `.json` suffix
    #[error("Unsupported feed format: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to read feed: {0}")]
    Store(#[source] anyhow::Error),
}

/// A feed in one of the two served representations.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedResponse {
    Xml(String),
    Json(Vec<NormalizedItem>),
}

impl FeedResponse {
    pub fn content_type(&self) -> &'static str {
        match self {
            FeedResponse::Xml(_) => ATOM_CONTENT_TYPE,
            FeedResponse::Json(_) => JSON_CONTENT_TYPE,
        }
    }

    /// Response body as sent to clients.
    pub fn into_body(self) -> Result<String, serde_json::Error> {
        match self {
            FeedResponse::Xml(document) => Ok(document),
            FeedResponse::Json(items) => serde_json::to_string(&items),
        }
    }
}

/// Looks up `path` (leading `/` optional) in `store`.
pub async fn read_feed<S: FeedStore>(store: &S, path: &str) -> Result<FeedResponse, ReadError> {
    let name = path.trim_start_matches('/');

    if name.ends_with(".xml") {
        let document = load(store, name).await?;
        return Ok(FeedResponse::Xml(document));
    }

    if let Some(stem) = name.strip_suffix(".json") {
        let key = format!("{stem}.xml");
        let document = load(store, &key).await?;
        let items = decode(&document);
        tracing::debug!(key = %key, items = items.len(), "Serving feed as JSON");
        return Ok(FeedResponse::Json(items));
    }

    Err(ReadError::UnsupportedFormat(name.to_string()))
}

async fn load<S: FeedStore>(store: &S, key: &str) -> Result<String, ReadError> {
    store
        .get(key)
        .await
        .map_err(ReadError::Store)?
        .ok_or_else(|| ReadError::NotFound(key.to_string()))
}
