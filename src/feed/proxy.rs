use reqwest::header::{HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};

use super::fetcher::{fetch, RawResponse, RequestProfile};
use crate::config::ProbeConfig;

/// Only this host ever receives the bearer token.
const OFFICIAL_READER: &str = "https://r.jina.ai/";

/// Fetches a page directly, then through reader-proxy prefixes.
///
/// A reader proxy is a service that fetches a page on our behalf when the
/// origin blocks us. The proxied URL is the prefix followed by the original
/// URL with its scheme removed.
pub struct ReaderProxy {
    prefixes: Vec<String>,
    api_key: Option<SecretString>,
}

impl std::fmt::Debug for ReaderProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderProxy")
            .field("prefixes", &self.prefixes)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ReaderProxy {
    /// Uses `config.api_key`, falling back to the `JINA_API_KEY` env var.
    pub fn new(config: &ProbeConfig) -> Self {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("JINA_API_KEY").ok())
            .filter(|k| !k.is_empty())
            .map(SecretString::from);

        Self {
            prefixes: config.proxies.clone(),
            api_key,
        }
    }

    /// Returns the first 2xx response: direct, then each prefix in order.
    pub async fn fetch(
        &self,
        client: &reqwest::Client,
        url: &str,
        profile: &RequestProfile,
    ) -> Option<RawResponse> {
        let candidates = std::iter::once(url.to_string()).chain(
            self.prefixes
                .iter()
                .map(|prefix| proxied_url(prefix, url)),
        );

        for candidate in candidates {
            let profile = self.profile_for(&candidate, profile);
            match fetch(client, &candidate, &profile).await {
                Ok(response) if response.is_success() => return Some(response),
                Ok(response) => {
                    tracing::debug!(url = %candidate, status = response.status, "Reader fetch rejected");
                }
                Err(e) => {
                    tracing::debug!(url = %candidate, error = %e, "Reader fetch failed");
                }
            }
        }
        None
    }

    fn profile_for(&self, url: &str, base: &RequestProfile) -> RequestProfile {
        let mut profile = base.clone();
        let Some(key) = &self.api_key else {
            return profile;
        };
        if !url.starts_with(OFFICIAL_READER) {
            return profile;
        }
        match HeaderValue::from_str(&format!("Bearer {}", key.expose_secret())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                profile.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("Reader API key is not a valid header value, sending without it"),
        }
        profile
    }
}

/// `https://r.jina.ai/http://` + `https://host/path` → `https://r.jina.ai/http://host/path`
pub fn proxied_url(prefix: &str, url: &str) -> String {
    let bare = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    format!("{prefix}{bare}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn profile() -> RequestProfile {
        RequestProfile {
            headers: HeaderMap::new(),
            timeout: Duration::from_secs(5),
            max_bytes: 1024 * 1024,
        }
    }

    fn reader(prefixes: Vec<String>, api_key: Option<&str>) -> ReaderProxy {
        ReaderProxy {
            prefixes,
            api_key: api_key.map(SecretString::from),
        }
    }

    #[test]
    fn test_proxied_url_strips_scheme() {
        assert_eq!(
            proxied_url("https://r.jina.ai/http://", "https://nitter.net/search?q=a"),
            "https://r.jina.ai/http://nitter.net/search?q=a"
        );
        assert_eq!(
            proxied_url("https://r.jina.ai/https://", "http://bridge.example/?q=a"),
            "https://r.jina.ai/https://bridge.example/?q=a"
        );
    }

    #[test]
    fn test_bearer_only_for_official_reader() {
        let proxy = reader(vec![], Some("secret-key"));

        let official = proxy.profile_for("https://r.jina.ai/http://x.example/", &profile());
        assert_eq!(
            official.headers.get(AUTHORIZATION).unwrap(),
            "Bearer secret-key"
        );

        let other = proxy.profile_for("https://reader.example/http://x.example/", &profile());
        assert!(other.headers.get(AUTHORIZATION).is_none());

        let direct = proxy.profile_for("https://x.example/", &profile());
        assert!(direct.headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_debug_masks_key() {
        let proxy = reader(vec![], Some("secret-key"));
        let debug = format!("{:?}", proxy);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_direct_success_skips_proxies() {
        let origin = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("direct"))
            .expect(1)
            .mount(&origin)
            .await;
        let relay = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&relay)
            .await;

        let proxy = reader(vec![format!("{}/http://", relay.uri())], None);
        let response = proxy
            .fetch(&reqwest::Client::new(), &origin.uri(), &profile())
            .await
            .unwrap();
        assert_eq!(response.body, "direct");
    }

    #[tokio::test]
    async fn test_falls_back_to_proxy_without_leaking_key() {
        let origin = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&origin)
            .await;
        let relay = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("via relay"))
            .expect(1)
            .mount(&relay)
            .await;

        let proxy = reader(vec![format!("{}/http://", relay.uri())], Some("secret-key"));
        let target = format!("{}/search?q=x", origin.uri());
        let response = proxy
            .fetch(&reqwest::Client::new(), &target, &profile())
            .await
            .unwrap();
        assert_eq!(response.body, "via relay");

        let requests = relay.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_all_routes_fail() {
        let proxy = reader(vec!["http://127.0.0.1:1/http://".into()], None);
        let response = proxy
            .fetch(&reqwest::Client::new(), "http://127.0.0.1:1/x", &profile())
            .await;
        assert!(response.is_none());
    }
}
