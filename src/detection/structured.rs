//! Embedded-structured-content channel: game detection inside script blocks.
//!
//! Casino front-ends commonly ship their catalog as JSON embedded in
//! `<script>` tags (app state, JSON-LD, inline config). A block whose shape
//! suggests structured data is parsed and walked recursively; everything else,
//! including blocks that fail to parse, gets a plain substring scan. The walk
//! is depth-bounded and only considers aliases of a minimum length so short
//! tokens buried in minified code don't produce junk matches.

use scraper::{Html, Selector};
use serde_json::Value;

use crate::alias::AliasIndex;

/// How deep the JSON walk follows nesting before giving up.
const MAX_WALK_DEPTH: usize = 10;

/// Result of trying to interpret one script block as structured data.
/// `Unparsed` feeds the raw-text fallback; no error is swallowed silently.
#[derive(Debug)]
pub enum ScriptParse {
    Parsed(Value),
    Unparsed,
}

/// Try to parse a script body as JSON.
pub fn parse_script_block(text: &str) -> ScriptParse {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value) => ScriptParse::Parsed(value),
        Err(_) => ScriptParse::Unparsed,
    }
}

/// Whether a script body looks like it carries catalog data worth parsing.
fn looks_structured(text: &str, lower: &str) -> bool {
    text.contains('{') && (lower.contains("\"games\"") || lower.contains("\"providers\""))
}

/// A single script-channel hit: canonical title plus the variant that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHit {
    pub title: String,
    pub variant: String,
}

/// Scan every script block of a parsed document.
pub fn scan_scripts(document: &Html, index: &AliasIndex, min_len: usize) -> Vec<ScriptHit> {
    let script_sel = Selector::parse("script").expect("script selector is valid");
    let jsonld_sel = Selector::parse(r#"script[type="application/ld+json"]"#)
        .expect("json-ld selector is valid");

    let mut hits: Vec<ScriptHit> = Vec::new();

    for element in document.select(&script_sel) {
        let body = element.inner_html();
        if body.trim().is_empty() {
            continue;
        }
        let lower = body.to_lowercase();

        if looks_structured(&body, &lower) {
            match parse_script_block(&body) {
                ScriptParse::Parsed(value) => {
                    walk_value(&value, index, min_len, 0, &mut hits);
                    continue;
                }
                ScriptParse::Unparsed => {
                    // Broken or non-JSON app state: fall through to the
                    // substring scan below.
                }
            }
        }

        scan_raw(&lower, index, min_len, &mut hits);
    }

    // JSON-LD blocks are parsed unconditionally; their shape is known.
    for element in document.select(&jsonld_sel) {
        if let ScriptParse::Parsed(value) = parse_script_block(&element.inner_html()) {
            walk_value(&value, index, min_len, 0, &mut hits);
        }
    }

    dedup_by_title(hits)
}

/// Substring scan over one lowercased script body.
fn scan_raw(lower: &str, index: &AliasIndex, min_len: usize, hits: &mut Vec<ScriptHit>) {
    for entry in index.entries() {
        if let Some(variant) = index.match_in(&entry.title, lower, min_len) {
            hits.push(ScriptHit {
                title: entry.title.clone(),
                variant: variant.to_string(),
            });
        }
    }
}

/// Recursive walk over parsed JSON, matching keys and values.
fn walk_value(
    value: &Value,
    index: &AliasIndex,
    min_len: usize,
    depth: usize,
    hits: &mut Vec<ScriptHit>,
) {
    if depth > MAX_WALK_DEPTH {
        return;
    }

    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let key_lower = key.to_lowercase();
                let value_lower = nested.to_string().to_lowercase();

                for entry in index.entries() {
                    let matched = index
                        .match_in(&entry.title, &key_lower, min_len)
                        .or_else(|| index.match_in(&entry.title, &value_lower, min_len));
                    if let Some(variant) = matched {
                        hits.push(ScriptHit {
                            title: entry.title.clone(),
                            variant: variant.to_string(),
                        });
                    }
                }

                if nested.is_object() || nested.is_array() {
                    walk_value(nested, index, min_len, depth + 1, hits);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                if item.is_object() || item.is_array() {
                    walk_value(item, index, min_len, depth + 1, hits);
                } else {
                    let item_lower = item.to_string().to_lowercase();
                    scan_raw(&item_lower, index, min_len, hits);
                }
            }
        }
        _ => {}
    }
}

fn dedup_by_title(hits: Vec<ScriptHit>) -> Vec<ScriptHit> {
    let mut seen = fnv::FnvHashSet::default();
    hits.into_iter()
        .filter(|h| seen.insert(h.title.clone()))
        .collect()
}
