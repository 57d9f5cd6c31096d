use anyhow::Result;
use std::future::Future;

use crate::feed::FeedMetadata;

/// Key-value capability the refresh pipeline and read API depend on.
///
/// Keys are feed file names such as `design.xml`; values are complete
/// serialized feed documents. Writes to the same key are last-writer-wins.
pub trait FeedStore: Send + Sync {
    /// Stores `document` under `key`, replacing any previous value, together
    /// with its metadata.
    fn put(
        &self,
        key: &str,
        document: &str,
        metadata: &FeedMetadata,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Returns the stored document, or `None` if the key was never written.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// All stored keys, sorted.
    fn list(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
}
