//! Configuration file parser for ~/.config/mirrorfeed/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which carries the stock feed keys, providers and mirror lists.
//! Unknown keys are ignored by serde, though we log a warning for each one.
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{ExtractLimits, FeedQuery, RequestProfile};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid pattern `{pattern}` for provider {provider}: {source}")]
    InvalidPattern {
        provider: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Item pattern for provider {0} needs a named `id` group")]
    MissingIdGroup(String),

    #[error("Invalid value for header {0}")]
    InvalidHeader(&'static str),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Array tables (`[[feeds]]`, `[[providers]]`) replace the defaults wholesale
/// when present.
///
/// The `Debug` impl masks `probe.api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding cached feeds. `None` = `feeds.db` next to the config.
    pub database_path: Option<PathBuf>,

    /// Per-request deadline for mirror fetches, in milliseconds.
    pub timeout_ms: u64,

    /// Maximum items kept from one extraction.
    pub item_cap: usize,

    /// Maximum title length in characters.
    pub title_cap: usize,

    /// Maximum accepted response body size.
    pub max_response_bytes: usize,

    /// How many feed keys a bulk refresh works on at once. 1 = sequential.
    pub refresh_concurrency: usize,

    pub headers: HeaderConfig,

    /// Feed keys to maintain, refreshed in this order.
    pub feeds: Vec<FeedQuery>,

    /// Upstream providers, tried in this order.
    pub providers: Vec<ProviderConfig>,

    pub probe: ProbeConfig,
}

/// Browser-like request headers sent to every mirror.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

/// One upstream content source and its mirror hosts.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// Request URL with `{base}` and `{query}` placeholders.
    pub url_template: String,
    pub mirrors: Vec<String>,
    pub shape: ShapeConfig,
}

/// Response shape a provider is expected to return.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ShapeConfig {
    /// Atom/RSS document
    Syndication,
    /// Raw HTML that needs item extraction
    Html(HtmlShapeConfig),
}

/// Extraction rules for an HTML-shaped provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HtmlShapeConfig {
    /// Regex locating one item; must have a named `id` group.
    pub item_pattern: String,
    /// Regexes tried in order inside the item window; group 1 is the text.
    pub content_patterns: Vec<String>,
    /// Bytes searched on either side of an item match.
    pub window: usize,
    /// Absolute item link built from item-pattern captures (`${name}`).
    pub link_template: String,
    /// Summary used when no content pattern matches.
    pub placeholder: String,
}

/// Settings for the `probe` diagnostic sweep.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
    /// Reader-proxy prefixes; the mirror URL minus its scheme is appended.
    pub proxies: Vec<String>,
    /// Bearer token for the r.jina.ai reader (alternative to JINA_API_KEY env var).
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            timeout_ms: 6000,
            item_cap: 40,
            title_cap: 100,
            max_response_bytes: 10 * 1024 * 1024,
            refresh_concurrency: 1,
            headers: HeaderConfig::default(),
            feeds: vec![
                FeedQuery {
                    key: "frontend.xml".into(),
                    query: "frontend developer".into(),
                },
                FeedQuery {
                    key: "design.xml".into(),
                    query: "design engineering".into(),
                },
            ],
            providers: vec![
                ProviderConfig {
                    name: "rss-bridge".into(),
                    url_template: "{base}/?action=display&bridge=Twitter&format=Atom&q={query}"
                        .into(),
                    mirrors: vec![
                        "https://bridge.suumitsu.eu".into(),
                        "https://rss-bridge.bb8.fun".into(),
                        "https://rssbridge.nixnet.services".into(),
                    ],
                    shape: ShapeConfig::Syndication,
                },
                ProviderConfig {
                    name: "nitter".into(),
                    url_template: "{base}/search?f=tweets&q={query}".into(),
                    mirrors: vec![
                        "https://nitter.poast.org".into(),
                        "https://nitter.moomoo.me".into(),
                        "https://nitter.privacydev.net".into(),
                        // keep last, flaky
                        "https://nitter.net".into(),
                    ],
                    shape: ShapeConfig::Html(HtmlShapeConfig::default()),
                },
            ],
            probe: ProbeConfig::default(),
        }
    }
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125 Safari/537.36".into(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into(),
            accept_language: "en-GB,en;q=0.9".into(),
        }
    }
}

impl Default for HtmlShapeConfig {
    fn default() -> Self {
        Self {
            item_pattern: r#"href="/(?P<user>[^"/]+)/status/(?P<id>\d+)""#.into(),
            content_patterns: vec![
                r#"(?s)<div class="tweet-content[^"]*"[^>]*>(.*?)</div>"#.into(),
                r#"(?s)<p class="tweet-content[^"]*"[^>]*>(.*?)</p>"#.into(),
                r#"(?s)<div class="content"[^>]*>(.*?)</div>"#.into(),
            ],
            window: 1200,
            link_template: "https://twitter.com/${user}/status/${id}".into(),
            placeholder: "Tweet by @${user}".into(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 7000,
            proxies: vec![
                "https://r.jina.ai/http://".into(),
                "https://r.jina.ai/https://".into(),
            ],
            api_key: None,
        }
    }
}

/// Mask the probe API key in Debug output to prevent secret leakage.
impl std::fmt::Debug for ProbeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeConfig")
            .field("timeout_ms", &self.timeout_ms)
            .field("proxies", &self.proxies)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("timeout_ms", &self.timeout_ms)
            .field("item_cap", &self.item_cap)
            .field("title_cap", &self.title_cap)
            .field("max_response_bytes", &self.max_response_bytes)
            .field("refresh_concurrency", &self.refresh_concurrency)
            .field("headers", &self.headers)
            .field("feeds", &self.feeds)
            .field("providers", &self.providers)
            .field("probe", &self.probe)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "database_path",
                "timeout_ms",
                "item_cap",
                "title_cap",
                "max_response_bytes",
                "refresh_concurrency",
                "headers",
                "feeds",
                "providers",
                "probe",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            providers = config.providers.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Headers, deadline and size limit for mirror requests.
    pub fn request_profile(&self) -> Result<RequestProfile, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.headers.user_agent)
                .map_err(|_| ConfigError::InvalidHeader("user-agent"))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&self.headers.accept)
                .map_err(|_| ConfigError::InvalidHeader("accept"))?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&self.headers.accept_language)
                .map_err(|_| ConfigError::InvalidHeader("accept-language"))?,
        );

        Ok(RequestProfile {
            headers,
            timeout: Duration::from_millis(self.timeout_ms),
            max_bytes: self.max_response_bytes,
        })
    }

    pub fn extract_limits(&self) -> ExtractLimits {
        ExtractLimits {
            item_cap: self.item_cap,
            title_cap: self.title_cap,
        }
    }

    /// Resolves the database location, defaulting to `feeds.db` in `config_dir`.
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("feeds.db"))
    }
}

// ============================================================================
// Tests
// ============================================================================
