use thiserror::Error;

use super::extract::{extract, ExtractLimits, HtmlRules, ProviderShape};
use super::fetcher::{fetch, FetchError, RequestProfile};
use super::types::NormalizedItem;
use crate::config::{Config, ConfigError, ProviderConfig, ShapeConfig};

/// Why a single mirror attempt was rejected.
///
/// These never leave the orchestrator as errors; they are kept in
/// [`Orchestration::attempts`] for logging and diagnostics.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("HTTP error: status {0}")]
    Status(u16),
    /// 2xx response that failed the provider's usability rule
    #[error("Response had no usable content")]
    Unusable,
}

/// One mirror request and its outcome, in the order it was made.
#[derive(Debug)]
pub struct Attempt {
    pub provider: String,
    pub mirror: String,
    pub url: String,
    /// Number of extracted items on success.
    pub result: Result<usize, AttemptError>,
}

/// Items from the first usable response.
#[derive(Debug, Clone)]
pub struct Harvest {
    pub provider: String,
    pub mirror: String,
    pub items: Vec<NormalizedItem>,
}

/// Outcome of one failover run. `harvest` is `None` when every mirror of
/// every provider was tried without a usable response.
#[derive(Debug)]
pub struct Orchestration {
    pub harvest: Option<Harvest>,
    pub attempts: Vec<Attempt>,
}

impl Orchestration {
    pub fn is_exhausted(&self) -> bool {
        self.harvest.is_none()
    }
}

/// An upstream content source: an ordered mirror list plus the shape its
/// responses come in.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub url_template: String,
    pub mirrors: Vec<String>,
    pub shape: ProviderShape,
}

impl Provider {
    fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let shape = match &config.shape {
            ShapeConfig::Syndication => ProviderShape::Syndication,
            ShapeConfig::Html(html) => ProviderShape::Html(HtmlRules::compile(&config.name, html)?),
        };
        Ok(Self {
            name: config.name.clone(),
            url_template: config.url_template.clone(),
            mirrors: config.mirrors.clone(),
            shape,
        })
    }

    /// Builds the request URL for `mirror`, percent-encoding `query`.
    pub fn request_url(&self, mirror: &str, query: &str) -> String {
        self.url_template
            .replace("{base}", mirror.trim_end_matches('/'))
            .replace("{query}", &urlencoding::encode(query))
    }
}

/// Walks providers and their mirrors in configured order until one returns
/// usable content.
///
/// Attempts are strictly sequential: the next mirror is only contacted after
/// the previous attempt has finished or timed out. There is no reordering,
/// health tracking or racing between mirrors.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    client: reqwest::Client,
    providers: Vec<Provider>,
    profile: RequestProfile,
    limits: ExtractLimits,
}

impl Orchestrator {
    /// Compiles provider rules and the request profile from `config`.
    pub fn new(client: reqwest::Client, config: &Config) -> Result<Self, ConfigError> {
        let providers = config
            .providers
            .iter()
            .map(Provider::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            client,
            providers,
            profile: config.request_profile()?,
            limits: config.extract_limits(),
        })
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn profile(&self) -> &RequestProfile {
        &self.profile
    }

    pub fn limits(&self) -> &ExtractLimits {
        &self.limits
    }

    /// Runs the failover sequence for one search query.
    pub async fn fetch_query(&self, query: &str) -> Orchestration {
        let mut attempts = Vec::new();

        for (index, provider) in self.providers.iter().enumerate() {
            if index > 0 {
                tracing::info!(
                    provider = %provider.name,
                    query = %query,
                    "Falling back to next provider"
                );
            }

            for mirror in &provider.mirrors {
                let url = provider.request_url(mirror, query);
                let result = self.attempt(provider, &url).await;

                match &result {
                    Ok(items) => tracing::debug!(
                        provider = %provider.name,
                        mirror = %mirror,
                        items = items.len(),
                        "Mirror returned usable content"
                    ),
                    Err(e) => tracing::debug!(
                        provider = %provider.name,
                        mirror = %mirror,
                        url = %url,
                        error = %e,
                        "Mirror attempt failed"
                    ),
                }

                let (result, harvest) = match result {
                    Ok(items) => (Ok(items.len()), Some(items)),
                    Err(e) => (Err(e), None),
                };
                attempts.push(Attempt {
                    provider: provider.name.clone(),
                    mirror: mirror.clone(),
                    url,
                    result,
                });

                if let Some(items) = harvest {
                    if items.is_empty() {
                        tracing::warn!(
                            provider = %provider.name,
                            mirror = %mirror,
                            query = %query,
                            "Mirror returned a feed with no items; stored document will be empty"
                        );
                    }
                    return Orchestration {
                        harvest: Some(Harvest {
                            provider: provider.name.clone(),
                            mirror: mirror.clone(),
                            items,
                        }),
                        attempts,
                    };
                }
            }
        }

        tracing::warn!(
            query = %query,
            attempts = attempts.len(),
            "All mirrors exhausted"
        );
        Orchestration {
            harvest: None,
            attempts,
        }
    }

    async fn attempt(
        &self,
        provider: &Provider,
        url: &str,
    ) -> Result<Vec<NormalizedItem>, AttemptError> {
        let response = fetch(&self.client, url, &self.profile).await?;
        if !response.is_success() {
            return Err(AttemptError::Status(response.status));
        }

        let items = extract(&response.body, &provider.shape, &self.limits);
        if !provider.shape.is_usable(&response.body, &items) {
            return Err(AttemptError::Unusable);
        }
        Ok(items)
    }
}
