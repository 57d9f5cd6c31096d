use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;

use super::codec::encode;
use super::orchestrator::Orchestrator;
use super::types::{FeedDocument, FeedMetadata, FeedQuery, NormalizedItem};
use crate::storage::FeedStore;

/// Errors that end a single key's refresh.
///
/// A failed refresh never modifies the stored document for that key.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Every mirror of every provider was tried without usable content
    #[error("no data from mirrors for query \"{0}\"")]
    Exhausted(String),
    #[error("Failed to encode feed: {0}")]
    Encode(#[source] anyhow::Error),
    #[error("Failed to store feed: {0}")]
    Store(#[source] anyhow::Error),
}

/// Per-key line of a bulk refresh summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub file: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fetches fresh items for `query` and stores them under `key`.
///
/// Returns the number of items written. On [`RefreshError::Exhausted`] the
/// store is not touched, so the previously cached document keeps serving.
pub async fn refresh_one<S: FeedStore>(
    orch: &Orchestrator,
    store: &S,
    key: &str,
    query: &str,
) -> Result<usize, RefreshError> {
    let outcome = orch.fetch_query(query).await;
    let Some(harvest) = outcome.harvest else {
        return Err(RefreshError::Exhausted(query.to_string()));
    };

    let count = harvest.items.len();
    let document = FeedDocument::new(format!("Search: {query}"), harvest.items);
    let xml = encode(&document).map_err(RefreshError::Encode)?;
    let metadata = FeedMetadata {
        query: query.to_string(),
        updated_at: document.updated,
    };
    store
        .put(key, &xml, &metadata)
        .await
        .map_err(RefreshError::Store)?;

    tracing::info!(
        key = %key,
        provider = %harvest.provider,
        mirror = %harvest.mirror,
        items = count,
        "Feed refreshed"
    );
    Ok(count)
}

/// Refreshes every configured feed key.
///
/// Each key gets its own failover run, and one key's failure never affects
/// another. Up to `concurrency` keys are in flight at once (0 is treated as
/// 1); reports come back in `feeds` order either way.
pub async fn refresh_all<S: FeedStore>(
    orch: &Orchestrator,
    store: &S,
    feeds: &[FeedQuery],
    concurrency: usize,
) -> Vec<RefreshReport> {
    let reports: Vec<RefreshReport> = stream::iter(feeds)
        .map(|feed| async move {
            match refresh_one(orch, store, &feed.key, &feed.query).await {
                Ok(_) => RefreshReport {
                    file: feed.key.clone(),
                    ok: true,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(key = %feed.key, error = %e, "Feed refresh failed");
                    RefreshReport {
                        file: feed.key.clone(),
                        ok: false,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let failed = reports.iter().filter(|r| !r.ok).count();
    tracing::info!(
        total = reports.len(),
        failed = failed,
        "Refresh complete"
    );
    reports
}

/// Writes a fixed one-entry document under `key` without any network access.
pub async fn seed<S: FeedStore>(store: &S, key: &str) -> anyhow::Result<()> {
    let document = FeedDocument::new(
        "Manual Seed",
        vec![NormalizedItem {
            title: "Hello world".into(),
            link: "https://twitter.com".into(),
            summary: "Seeded item".into(),
        }],
    );
    let metadata = FeedMetadata {
        query: "manual seed".into(),
        updated_at: Utc::now(),
    };
    store.put(key, &encode(&document)?, &metadata).await?;
    tracing::info!(key = %key, "Seeded feed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProviderConfig, ShapeConfig};
    use crate::feed::codec::decode;
    use crate::storage::Database;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ATOM: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>t</title>
        <entry><title>Fresh</title><link href="https://twitter.com/a/status/1"/><summary>new</summary></entry>
        </feed>"#;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn orchestrator(server: &MockServer) -> Orchestrator {
        let config = Config {
            providers: vec![ProviderConfig {
                name: "bridge".into(),
                url_template: "{base}/?q={query}".into(),
                mirrors: vec![server.uri()],
                shape: ShapeConfig::Syndication,
            }],
            ..Config::default()
        };
        Orchestrator::new(reqwest::Client::new(), &config).unwrap()
    }

    fn feed(key: &str, query: &str) -> FeedQuery {
        FeedQuery {
            key: key.into(),
            query: query.into(),
        }
    }

    #[tokio::test]
    async fn test_refresh_one_stores_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "rust"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ATOM))
            .mount(&server)
            .await;
        let db = test_db().await;

        let count = refresh_one(&orchestrator(&server), &db, "rust.xml", "rust")
            .await
            .unwrap();
        assert_eq!(count, 1);

        let stored = db.get("rust.xml").await.unwrap().unwrap();
        assert!(stored.contains("<title>Search: rust</title>"));
        let items = decode(&stored);
        assert_eq!(items[0].title, "Fresh");
        assert_eq!(items[0].link, "https://twitter.com/a/status/1");
        assert_eq!(db.feed_metadata("rust.xml").await.unwrap().unwrap().query, "rust");
    }

    #[tokio::test]
    async fn test_refresh_one_exhausted_leaves_store_alone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let db = test_db().await;

        let result = refresh_one(&orchestrator(&server), &db, "rust.xml", "rust").await;
        assert!(matches!(result, Err(RefreshError::Exhausted(q)) if q == "rust"));
        assert!(db.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_all_isolates_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "good"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ATOM))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "bad"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let db = test_db().await;
        let feeds = [feed("bad.xml", "bad"), feed("good.xml", "good")];

        let reports = refresh_all(&orchestrator(&server), &db, &feeds, 1).await;

        assert_eq!(
            reports,
            vec![
                RefreshReport {
                    file: "bad.xml".into(),
                    ok: false,
                    error: Some("no data from mirrors for query \"bad\"".into()),
                },
                RefreshReport {
                    file: "good.xml".into(),
                    ok: true,
                    error: None,
                },
            ]
        );
        assert_eq!(db.list().await.unwrap(), vec!["good.xml"]);
    }

    #[tokio::test]
    async fn test_refresh_all_zero_concurrency_keeps_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ATOM))
            .mount(&server)
            .await;
        let db = test_db().await;
        let feeds: Vec<_> = (0..4).map(|i| feed(&format!("k{i}.xml"), "q")).collect();

        // 0 is treated as sequential
        let reports = refresh_all(&orchestrator(&server), &db, &feeds, 0).await;
        let files: Vec<_> = reports.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(files, ["k0.xml", "k1.xml", "k2.xml", "k3.xml"]);
        assert!(reports.iter().all(|r| r.ok));
    }

    #[test]
    fn test_report_json_shape() {
        let ok = RefreshReport {
            file: "a.xml".into(),
            ok: true,
            error: None,
        };
        let failed = RefreshReport {
            file: "b.xml".into(),
            ok: false,
            error: Some("no data from mirrors".into()),
        };
        assert_eq!(
            serde_json::to_value([ok, failed]).unwrap(),
            serde_json::json!([
                {"file": "a.xml", "ok": true},
                {"file": "b.xml", "ok": false, "error": "no data from mirrors"}
            ])
        );
    }

    #[tokio::test]
    async fn test_seed_writes_fixed_entry() {
        let db = test_db().await;
        seed(&db, "frontend.xml").await.unwrap();

        let stored = db.get("frontend.xml").await.unwrap().unwrap();
        assert!(stored.contains("<title>Manual Seed</title>"));
        assert_eq!(
            decode(&stored),
            vec![NormalizedItem {
                title: "Hello world".into(),
                link: "https://twitter.com".into(),
                summary: "Seeded item".into(),
            }]
        );
        assert_eq!(
            db.feed_metadata("frontend.xml").await.unwrap().unwrap().query,
            "manual seed"
        );
    }
}
