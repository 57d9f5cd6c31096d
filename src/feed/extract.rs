use regex::{Captures, Regex};
use std::collections::HashSet;
use url::Url;

use super::codec;
use super::types::NormalizedItem;
use crate::config::{ConfigError, HtmlShapeConfig};
use crate::util::{clean_text, window_bounds};

/// Caps applied to every extraction call.
#[derive(Debug, Clone, Copy)]
pub struct ExtractLimits {
    /// Items beyond this count are dropped, earliest kept.
    pub item_cap: usize,
    /// Maximum title length in characters.
    pub title_cap: usize,
}

/// What a provider's mirrors are expected to return, and how to read it.
#[derive(Debug, Clone)]
pub enum ProviderShape {
    /// Atom or RSS, already close to canonical form
    Syndication,
    /// Noisy HTML that needs pattern-based item extraction
    Html(HtmlRules),
}

/// Compiled extraction strategy for one HTML-shaped provider.
///
/// `content` is an ordered strategy list: the first pattern with non-empty
/// text inside an item's window supplies it. The window stops at the
/// neighbouring items' anchors.
#[derive(Debug, Clone)]
pub struct HtmlRules {
    item: Regex,
    content: Vec<Regex>,
    window: usize,
    link_template: String,
    placeholder: String,
}

impl HtmlRules {
    /// Compiles the rules for `provider`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidPattern`] if any regex fails to compile
    /// - [`ConfigError::MissingIdGroup`] if the item pattern has no `id` group
    pub fn compile(provider: &str, config: &HtmlShapeConfig) -> Result<Self, ConfigError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                provider: provider.to_string(),
                pattern: pattern.to_string(),
                source,
            })
        };

        let item = compile(&config.item_pattern)?;
        if !item.capture_names().any(|name| name == Some("id")) {
            return Err(ConfigError::MissingIdGroup(provider.to_string()));
        }
        let content = config
            .content_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            item,
            content,
            window: config.window,
            link_template: config.link_template.clone(),
            placeholder: config.placeholder.clone(),
        })
    }
}

impl ProviderShape {
    /// Whether a 2xx body is worth keeping for this shape.
    ///
    /// Syndication bodies need a feed root or entry marker. HTML bodies need
    /// at least one extractable item, which the caller has already computed.
    pub fn is_usable(&self, body: &str, items: &[NormalizedItem]) -> bool {
        match self {
            ProviderShape::Syndication => has_feed_markers(body),
            ProviderShape::Html(_) => !items.is_empty(),
        }
    }
}

/// Cheap check for Atom markers, matching what syndication mirrors return.
pub fn has_feed_markers(body: &str) -> bool {
    body.contains("<entry") || body.contains("<feed")
}

/// Turns a raw mirror response into normalized items.
///
/// Never fails. Unparseable or empty input yields an empty `Vec`, and the
/// result never holds more than `limits.item_cap` items.
pub fn extract(raw: &str, shape: &ProviderShape, limits: &ExtractLimits) -> Vec<NormalizedItem> {
    match shape {
        ProviderShape::Syndication => extract_syndication(raw, limits),
        ProviderShape::Html(rules) => extract_html(raw, rules, limits),
    }
}

fn extract_syndication(raw: &str, limits: &ExtractLimits) -> Vec<NormalizedItem> {
    // (title, link, summary) as found in the document, before cleanup
    let entries: Vec<(String, String, String)> = match feed_rs::parser::parse(raw.as_bytes()) {
        Ok(feed) => feed
            .entries
            .into_iter()
            .map(|entry| {
                let link = entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default();
                let summary = entry
                    .summary
                    .map(|s| s.content)
                    .or_else(|| entry.content.and_then(|c| c.body))
                    .unwrap_or_default();
                let title = entry.title.map(|t| t.content).unwrap_or_default();
                (title, link, summary)
            })
            .collect(),
        Err(e) => {
            tracing::debug!(error = %e, "Strict feed parse failed, using tolerant decoder");
            codec::decode(raw)
                .into_iter()
                .map(|item| (item.title, item.link, item.summary))
                .collect()
        }
    };

    let mut skipped = 0usize;
    let items: Vec<NormalizedItem> = entries
        .into_iter()
        .filter_map(|(title, link, summary)| {
            let Some(link) = absolute_link(&link) else {
                skipped += 1;
                return None;
            };
            Some(NormalizedItem::new(
                &clean_text(&title),
                link,
                clean_text(&summary),
                limits.title_cap,
            ))
        })
        .take(limits.item_cap)
        .collect();

    if skipped > 0 {
        tracing::debug!(skipped = skipped, "Feed entries without a usable link dropped");
    }

    items
}

fn extract_html(html: &str, rules: &HtmlRules, limits: &ExtractLimits) -> Vec<NormalizedItem> {
    // Every anchor with an id, duplicates included: they bound neighbours' context.
    let anchors: Vec<Captures<'_>> = rules
        .item
        .captures_iter(html)
        .filter(|caps| caps.name("id").is_some())
        .collect();

    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for (index, caps) in anchors.iter().enumerate() {
        if items.len() >= limits.item_cap {
            break;
        }
        let Some(id) = caps.name("id") else {
            continue;
        };
        if !seen.insert(id.as_str()) {
            continue;
        }

        let mut link = String::new();
        caps.expand(&rules.link_template, &mut link);
        let Some(link) = absolute_link(&link) else {
            tracing::debug!(link = %link, "Skipping item with non-absolute link");
            continue;
        };

        let (behind, ahead) = item_context(html, &anchors, index, rules.window);
        let text = item_text(rules, behind, ahead).unwrap_or_else(|| {
            let mut placeholder = String::new();
            caps.expand(&rules.placeholder, &mut placeholder);
            placeholder
        });

        items.push(NormalizedItem::new(&text, link, text.clone(), limits.title_cap));
    }

    items
}

/// Splits the window around `anchors[index]` into the text before and after
/// its anchor, cut short at the nearest anchor of a different item.
fn item_context<'h>(
    html: &'h str,
    anchors: &[Captures<'h>],
    index: usize,
    window: usize,
) -> (&'h str, &'h str) {
    let at = anchors[index].get_match().start();
    let id = anchors[index].name("id").map(|m| m.as_str());
    let other = |caps: &&Captures<'h>| caps.name("id").map(|m| m.as_str()) != id;

    let (mut start, mut end) = window_bounds(html, at, window);
    if let Some(prev) = anchors[..index].iter().rev().find(other) {
        start = start.max(prev.get_match().end());
    }
    if let Some(next) = anchors[index + 1..].iter().find(other) {
        end = end.min(next.get_match().start());
    }

    (&html[start..at], &html[at..end])
}

/// First non-empty text by pattern priority. Within a pattern, the nearest
/// match after the anchor wins, then the nearest one before it.
fn item_text<'h>(rules: &HtmlRules, behind: &'h str, ahead: &'h str) -> Option<String> {
    let text = |caps: Captures<'h>| {
        caps.get(1)
            .map(|m| clean_text(m.as_str()))
            .filter(|t| !t.is_empty())
    };
    rules.content.iter().find_map(|pattern| {
        pattern
            .captures_iter(ahead)
            .find_map(text)
            .or_else(|| pattern.captures_iter(behind).filter_map(text).last())
    })
}

fn absolute_link(link: &str) -> Option<String> {
    let link = link.trim();
    let parsed = Url::parse(link).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| link.to_string())
}
