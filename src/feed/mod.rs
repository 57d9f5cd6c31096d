//! Feed harvesting: fetch search results from redundant mirrors, normalize
//! them, and write canonical Atom documents to the store.
//!
//! - **Fetching**: one timeout-bounded GET per mirror ([`fetch`])
//! - **Failover**: providers and mirrors tried in strict order ([`Orchestrator`])
//! - **Extraction**: syndication passthrough or pattern-based HTML scraping ([`extract`])
//! - **Codec**: canonical Atom encoding and tolerant decoding ([`encode`], [`decode`])
//! - **Refresh**: per-key pipeline with failure isolation ([`refresh_all`])
//!
//! # Example
//!
//! ```ignore
//! use mirrorfeed::feed::{refresh_all, Orchestrator};
//!
//! let orch = Orchestrator::new(reqwest::Client::new(), &config)?;
//! let reports = refresh_all(&orch, &db, &config.feeds, config.refresh_concurrency).await;
//! ```

mod codec;
mod extract;
mod fetcher;
mod orchestrator;
mod probe;
mod proxy;
mod refresh;
mod types;

pub use codec::{decode, encode};
pub use extract::{extract, has_feed_markers, ExtractLimits, HtmlRules, ProviderShape};
pub use fetcher::{fetch, FetchError, RawResponse, RequestProfile};
pub use orchestrator::{Attempt, AttemptError, Harvest, Orchestration, Orchestrator, Provider};
pub use probe::{probe, MirrorProbe, ProbeReport, ProviderProbe};
pub use proxy::{proxied_url, ReaderProxy};
pub use refresh::{refresh_all, refresh_one, seed, RefreshError, RefreshReport};
pub use types::{FeedDocument, FeedMetadata, FeedQuery, NormalizedItem};
