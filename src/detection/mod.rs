//! Multi-channel catalog detection over fetched page content.
//!
//! One [`DetectionEngine`] instance serves a whole run. For a page it walks
//! four channels in a fixed order: visible text, embedded script content,
//! markup attributes, and (for targets where the landing page yields nothing)
//! a bounded sweep of common subpage paths plus an optional search-endpoint
//! probe. The first channel to find an entity owns the attribution; later
//! channels never overwrite it.
//!
//! Parsing is CPU-bound and `scraper::Html` is not `Send`, so the async entry
//! points hop through `spawn_blocking` and only the cheap result structs cross
//! the await.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use fnv::FnvHashSet;
use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::acquisition::HttpFetcher;
use crate::alias::AliasIndex;
use crate::config::DetectionSettings;

pub mod structured;

// ── Results ─────────────────────────────────────────────────────────────────

/// Which channel produced a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    VisibleText,
    Script,
    Attribute,
    Subpage,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Channel::VisibleText => "visible_text",
            Channel::Script => "script_tags",
            Channel::Attribute => "html_attributes",
            Channel::Subpage => "subpage_scan",
        };
        f.write_str(name)
    }
}

/// One detected catalog entity with how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionEvidence {
    /// Canonical catalog title.
    pub entity: String,
    /// The alias variant that actually matched.
    pub variant: String,
    pub channel: Channel,
    /// Surrounding text for text-channel matches.
    pub snippet: Option<String>,
}

/// Accumulated findings for one target. Entities are unique; the channel that
/// found one first keeps the attribution through merges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detections {
    pub evidence: Vec<DetectionEvidence>,
    pub provider_mention: bool,
    pub provider_snippets: Vec<String>,
    /// Entity → absolute game-page URL, where an anchor gave one away.
    pub deep_links: BTreeMap<String, String>,
    seen: FnvHashSet<String>,
}

impl Detections {
    pub fn insert(&mut self, evidence: DetectionEvidence) {
        if self.seen.insert(evidence.entity.clone()) {
            self.evidence.push(evidence);
        }
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.seen.contains(entity)
    }

    pub fn is_empty(&self) -> bool {
        self.evidence.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.evidence.iter().map(|e| e.entity.as_str())
    }

    /// Channels that contributed at least one entity, in evidence order.
    pub fn channels(&self) -> Vec<Channel> {
        let mut out = Vec::new();
        for ev in &self.evidence {
            if !out.contains(&ev.channel) {
                out.push(ev.channel);
            }
        }
        out
    }

    /// Fold another page's findings in. Existing entities win; deep links and
    /// provider state are unioned.
    pub fn merge_from(&mut self, other: Detections) {
        for ev in other.evidence {
            self.insert(ev);
        }
        for (entity, link) in other.deep_links {
            self.deep_links.entry(entity).or_insert(link);
        }
        self.provider_mention |= other.provider_mention;
        for snippet in other.provider_snippets {
            if self.provider_snippets.len() < 2 && !self.provider_snippets.contains(&snippet) {
                self.provider_snippets.push(snippet);
            }
        }
    }

    fn relabel(&mut self, channel: Channel) {
        for ev in &mut self.evidence {
            ev.channel = channel;
        }
    }

    /// Human-readable evidence lines for the output record.
    pub fn evidence_strings(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .channels()
            .iter()
            .map(|c| format!("Detected using: {c}"))
            .collect();
        out.extend(self.provider_snippets.iter().cloned());
        out
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// Shared, read-only detection state for a run.
#[derive(Debug, Clone)]
pub struct DetectionEngine {
    index: Arc<AliasIndex>,
    settings: DetectionSettings,
    /// Lowercased provider search terms.
    provider_terms: Vec<String>,
    /// Case-insensitive provider-context patterns ("powered by", ...).
    context_patterns: Vec<Regex>,
}

impl DetectionEngine {
    pub fn new(
        index: Arc<AliasIndex>,
        settings: DetectionSettings,
        provider_terms: Vec<String>,
    ) -> Self {
        let context_patterns = settings
            .provider_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(&regex::escape(p))
                    .case_insensitive(true)
                    .build()
                    .expect("escaped context pattern is valid")
            })
            .collect();
        let provider_terms = provider_terms
            .into_iter()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            index,
            settings,
            provider_terms,
            context_patterns,
        }
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    /// First provider search term, used by the search probe.
    pub fn primary_term(&self) -> Option<&str> {
        self.provider_terms.first().map(String::as_str)
    }

    /// Run the static channels over one page. Pure; callers in async context
    /// go through [`DetectionEngine::detect_async`].
    pub fn detect(&self, html: &str, page_url: &str) -> Detections {
        let doc = Html::parse_document(html);
        let visible = visible_text(&doc);
        let visible_lower = visible.to_lowercase();

        let mut out = Detections::default();

        if self.settings.visible_text_channel {
            for entry in self.index.entries() {
                let hit = entry
                    .variants
                    .iter()
                    .find_map(|v| visible_lower.find(v.as_str()).map(|pos| (v, pos)));
                if let Some((variant, pos)) = hit {
                    let snippet = context_snippet(&visible_lower, pos, variant.len());
                    out.insert(DetectionEvidence {
                        entity: entry.title.clone(),
                        variant: variant.clone(),
                        channel: Channel::VisibleText,
                        snippet: Some(snippet),
                    });
                }
            }
        }

        if self.settings.script_channel {
            for hit in
                structured::scan_scripts(&doc, &self.index, self.settings.min_alias_length)
            {
                out.insert(DetectionEvidence {
                    entity: hit.title,
                    variant: hit.variant,
                    channel: Channel::Script,
                    snippet: None,
                });
            }
        }

        if self.settings.attribute_channel {
            self.scan_attributes(&doc, &mut out);
        }

        out.deep_links = self.extract_links(&doc, page_url, &out);
        self.provider_scan(&doc, &mut out);
        out
    }

    /// `detect` behind `spawn_blocking`; the engine clone is cheap.
    pub async fn detect_async(&self, html: String, page_url: String) -> Result<Detections> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.detect(&html, &page_url))
            .await
            .context("detection worker failed")
    }

    /// Channel 4: visit common catalog subpaths until one yields entities.
    /// Returns the merged findings and how many subpages loaded.
    pub async fn sweep_subpages(
        &self,
        fetcher: &HttpFetcher,
        base_url: &str,
    ) -> Result<(Detections, u32)> {
        let mut merged = Detections::default();
        let mut pages = 0u32;

        for path in &self.settings.subpage_paths {
            let url = HttpFetcher::join_path(base_url, path);
            let outcome = fetcher.fetch(&url).await;
            let Some(html) = outcome.content else {
                continue;
            };
            pages += 1;

            let mut found = self.detect_async(html, outcome.final_url).await?;
            found.relabel(Channel::Subpage);
            let hit = !found.is_empty();
            debug!(url, entities = found.evidence.len(), "subpage swept");
            merged.merge_from(found);
            if hit {
                break;
            }
        }

        Ok((merged, pages))
    }

    /// Probe the site's search endpoint for the provider term. Two URL shapes
    /// cover the common site generators.
    pub async fn search_probe(
        &self,
        fetcher: &HttpFetcher,
        base_url: &str,
        term: &str,
    ) -> Result<(Detections, u32)> {
        let Ok(base) = Url::parse(base_url) else {
            return Ok((Detections::default(), 0));
        };

        let mut merged = Detections::default();
        let mut pages = 0u32;

        for (path, key) in [("/search", "q"), ("/", "s")] {
            let mut probe = base.clone();
            probe.set_path(path);
            probe.query_pairs_mut().clear().append_pair(key, term);

            let outcome = fetcher.fetch(probe.as_str()).await;
            let Some(html) = outcome.content else {
                continue;
            };
            pages += 1;

            let mut found = self.detect_async(html, outcome.final_url).await?;
            found.relabel(Channel::Subpage);
            let hit = !found.is_empty();
            debug!(url = %probe, entities = found.evidence.len(), "search probed");
            merged.merge_from(found);
            if hit {
                break;
            }
        }

        Ok((merged, pages))
    }

    fn scan_attributes(&self, doc: &Html, out: &mut Detections) {
        let every = Selector::parse("*").expect("universal selector is valid");
        for element in doc.select(&every) {
            for (_, value) in element.value().attrs() {
                if value.is_empty() {
                    continue;
                }
                let value_lower = value.to_lowercase();
                for entry in self.index.entries() {
                    if out.contains(&entry.title) {
                        continue;
                    }
                    if let Some(variant) =
                        entry.variants.iter().find(|v| value_lower.contains(v.as_str()))
                    {
                        out.insert(DetectionEvidence {
                            entity: entry.title.clone(),
                            variant: variant.clone(),
                            channel: Channel::Attribute,
                            snippet: None,
                        });
                    }
                }
            }
        }
    }

    /// Anchors whose normalized text and a detected title contain one another
    /// give away the direct game page.
    fn extract_links(
        &self,
        doc: &Html,
        page_url: &str,
        det: &Detections,
    ) -> BTreeMap<String, String> {
        let mut links = BTreeMap::new();
        if det.is_empty() {
            return links;
        }

        let anchors = Selector::parse("a[href]").expect("anchor selector is valid");
        let base = Url::parse(page_url).ok();

        for anchor in doc.select(&anchors) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let text: String = anchor.text().collect();
            let text_squashed = squash(&text);
            if text_squashed.is_empty() {
                continue;
            }

            for entity in det.entities() {
                if links.contains_key(entity) {
                    continue;
                }
                let Some(entry) = self.index.get(entity) else {
                    continue;
                };
                if entry.squashed.is_empty() {
                    continue;
                }
                if text_squashed.contains(&entry.squashed)
                    || entry.squashed.contains(&text_squashed)
                {
                    let resolved = match &base {
                        Some(b) => b
                            .join(href)
                            .map(|u| u.to_string())
                            .unwrap_or_else(|_| href.to_string()),
                        None => href.to_string(),
                    };
                    links.insert(entity.to_string(), resolved);
                }
            }
        }

        links
    }

    /// Provider-name scan over the full page text (scripts included, where
    /// provider credits often live). The mention flag only goes up when a
    /// context pattern also matches somewhere on the page.
    fn provider_scan(&self, doc: &Html, out: &mut Detections) {
        if self.provider_terms.is_empty() {
            return;
        }

        let full_text: String = doc.root_element().text().collect();
        let full_lower = full_text.to_lowercase();

        let mut snippets: Vec<String> = Vec::new();
        for term in &self.provider_terms {
            let mut at = 0;
            while let Some(pos) = full_lower[at..].find(term.as_str()) {
                let abs = at + pos;
                if snippets.len() < 2 {
                    snippets.push(context_snippet(&full_lower, abs, term.len()));
                }
                at = abs + term.len();
                if snippets.len() >= 2 {
                    break;
                }
            }
        }

        if snippets.is_empty() {
            return;
        }

        out.provider_snippets = snippets;
        out.provider_mention = doc
            .root_element()
            .text()
            .any(|node| self.context_patterns.iter().any(|re| re.is_match(node)));
    }
}

// ── Text helpers ────────────────────────────────────────────────────────────

/// Text content with markup stripped, skipping script and style bodies.
fn visible_text(doc: &Html) -> String {
    let mut out = String::new();
    collect_visible(doc.root_element(), &mut out);
    out
}

fn collect_visible(element: ElementRef<'_>, out: &mut String) {
    for node in element.children() {
        if let Some(child) = ElementRef::wrap(node) {
            if matches!(child.value().name(), "script" | "style") {
                continue;
            }
            collect_visible(child, out);
        } else if let Some(text) = node.value().as_text() {
            out.push_str(text);
        }
    }
}

/// Lowercase, alphanumeric-only form used for anchor-text comparison.
fn squash(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Up to 50 characters of context on both sides of a match, whitespace
/// collapsed. Slices on char boundaries.
fn context_snippet(text: &str, start: usize, len: usize) -> String {
    let begin = text[..start]
        .char_indices()
        .rev()
        .nth(49)
        .map_or(0, |(i, _)| i);
    let after = start + len;
    let end = text[after..]
        .char_indices()
        .nth(50)
        .map_or(text.len(), |(i, _)| after + i);
    text[begin..end].split_whitespace().collect::<Vec<_>>().join(" ")
}
