//! Alias index: canonical game title → the variant strings matched on pages.
//!
//! Built once from the catalog, read-only afterwards (shared behind `Arc`
//! across work units). The variant set is deliberately recall-favoring:
//! separator and suffix permutations plus, for multi-word titles, trailing-word
//! shorthands the way casino front-ends tend to abbreviate game names. The
//! short bare-trailing-word form ("Goal Crash" → "crash") is the one knob with
//! a real false-positive cost, so it sits behind
//! [`DetectionSettings::short_word_variants`].

use fnv::{FnvHashMap, FnvHashSet};
use regex::Regex;

use crate::catalog::GameCatalog;
use crate::config::DetectionSettings;

/// One catalog entity and everything we will match it by.
#[derive(Debug, Clone)]
pub struct AliasEntry {
    /// Canonical title, as written in the catalog.
    pub title: String,
    /// Title lowercased with every non-alphanumeric removed, for link matching.
    pub squashed: String,
    /// Ordered variant set, lowercased, deduplicated.
    pub variants: Vec<String>,
}

/// Read-only lookup structure over all catalog entities.
#[derive(Debug, Clone)]
pub struct AliasIndex {
    entries: Vec<AliasEntry>,
    by_title: FnvHashMap<String, usize>,
    min_alias_length: usize,
}

impl AliasIndex {
    pub fn build(catalog: &GameCatalog, settings: &DetectionSettings) -> Self {
        let strip = Regex::new(r"[^a-z0-9]").expect("strip regex is valid");
        let dash = Regex::new(r"[^a-z0-9]+").expect("dash regex is valid");

        let mut entries = Vec::with_capacity(catalog.games.len());
        let mut by_title = FnvHashMap::default();

        for game in &catalog.games {
            let mut variants: Vec<String> = Vec::new();
            let mut seen: FnvHashSet<String> = FnvHashSet::default();
            let mut push = |v: String, out: &mut Vec<String>| {
                if !v.is_empty() && seen.insert(v.clone()) {
                    out.push(v);
                }
            };

            let names = std::iter::once(game.title.as_str())
                .chain(game.aliases.iter().map(String::as_str));
            for name in names {
                let lower = name.to_lowercase();
                push(lower.clone(), &mut variants);
                push(lower.replace(' ', ""), &mut variants);
                push(lower.replace(' ', "-"), &mut variants);
                push(lower.replace(' ', "_"), &mut variants);
                push(lower.replace(' ', "."), &mut variants);
                push(strip.replace_all(&lower, "").into_owned(), &mut variants);
                push(dash.replace_all(&lower, "-").into_owned(), &mut variants);

                push(format!("{lower}-slot"), &mut variants);
                push(format!("{lower}-game"), &mut variants);
                push(format!("{lower}slot"), &mut variants);

                let words: Vec<&str> = lower.split_whitespace().collect();
                if words.len() > 1 {
                    let last = words[words.len() - 1];
                    if settings.short_word_variants && last.len() >= settings.min_alias_length {
                        push(last.to_string(), &mut variants);
                    }
                    let prev = words[words.len() - 2];
                    push(format!("{prev}{last}"), &mut variants);
                    push(format!("{prev}-{last}"), &mut variants);
                }
            }

            by_title.insert(game.title.clone(), entries.len());
            entries.push(AliasEntry {
                title: game.title.clone(),
                squashed: strip.replace_all(&game.title.to_lowercase(), "").into_owned(),
                variants,
            });
        }

        Self {
            entries,
            by_title,
            min_alias_length: settings.min_alias_length,
        }
    }

    pub fn entries(&self) -> &[AliasEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Minimum variant length enforced by the script/JSON channels.
    pub fn min_alias_length(&self) -> usize {
        self.min_alias_length
    }

    pub fn get(&self, title: &str) -> Option<&AliasEntry> {
        self.by_title.get(title).map(|&i| &self.entries[i])
    }

    /// First variant of `title` found in `haystack` (already lowercased).
    /// Variants shorter than `min_len` are skipped.
    pub fn match_in(&self, title: &str, haystack: &str, min_len: usize) -> Option<&str> {
        let entry = self.get(title)?;
        entry
            .variants
            .iter()
            .find(|v| v.len() >= min_len && haystack.contains(v.as_str()))
            .map(String::as_str)
    }
}
