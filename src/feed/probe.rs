use serde::Serialize;
use std::time::Duration;

use super::extract::extract;
use super::orchestrator::Orchestrator;
use super::proxy::ReaderProxy;
use crate::config::ProbeConfig;

/// What one mirror returned during a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorProbe {
    pub url: String,
    /// Whether the provider's usability rule accepted the body.
    pub ok: bool,
    pub items: usize,
    /// Body length in bytes; 0 when no route returned 2xx.
    pub len: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderProbe {
    pub provider: String,
    pub mirrors: Vec<MirrorProbe>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub query: String,
    pub providers: Vec<ProviderProbe>,
}

/// Sweeps every mirror of every provider for `query` and reports which ones
/// return content.
///
/// Unlike [`Orchestrator::fetch_query`] this never stops early, and each
/// mirror is also tried through the configured reader proxies when the
/// direct request fails. Nothing is stored.
pub async fn probe(orch: &Orchestrator, query: &str, config: &ProbeConfig) -> ProbeReport {
    let reader = ReaderProxy::new(config);
    let mut profile = orch.profile().clone();
    profile.timeout = Duration::from_millis(config.timeout_ms);

    let mut providers = Vec::with_capacity(orch.providers().len());
    for provider in orch.providers() {
        let mut mirrors = Vec::with_capacity(provider.mirrors.len());
        for mirror in &provider.mirrors {
            let url = provider.request_url(mirror, query);
            let body = reader
                .fetch(orch.client(), &url, &profile)
                .await
                .map(|response| response.body);

            let probe = match body {
                Some(body) => {
                    let items = extract(&body, &provider.shape, orch.limits());
                    MirrorProbe {
                        ok: provider.shape.is_usable(&body, &items),
                        items: items.len(),
                        len: body.len(),
                        url,
                    }
                }
                None => MirrorProbe {
                    url,
                    ok: false,
                    items: 0,
                    len: 0,
                },
            };
            tracing::debug!(
                provider = %provider.name,
                mirror = %mirror,
                ok = probe.ok,
                items = probe.items,
                "Probed mirror"
            );
            mirrors.push(probe);
        }
        providers.push(ProviderProbe {
            provider: provider.name.clone(),
            mirrors,
        });
    }

    ProbeReport {
        query: query.to_string(),
        providers,
    }
}
