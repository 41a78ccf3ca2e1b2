//! Input documents: the game catalog and the target list.
//!
//! Both are plain JSON files loaded once before the crawl starts. A missing or
//! malformed file is fatal — there is nothing useful to crawl without them.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// One catalog entry: a canonical game title plus any aliases the provider
/// already publishes for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub title: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// The provider's game catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameCatalog {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub games: Vec<Game>,
}

impl GameCatalog {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Provider terms to search for when the config does not set any:
    /// the provider name as written, lowercased, squashed, and hyphenated.
    pub fn provider_terms(&self) -> Vec<String> {
        let Some(name) = self.provider.as_deref() else {
            return Vec::new();
        };
        let lower = name.to_lowercase();
        let mut terms = vec![
            name.to_string(),
            lower.clone(),
            lower.replace(' ', ""),
            lower.replace(' ', "-"),
        ];
        terms.dedup();
        terms
    }
}

/// One site to scan. Immutable, externally supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub name: String,
    pub url: String,
    #[serde(default = "unknown")]
    pub region: String,
    #[serde(default = "unknown")]
    pub country: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn unknown() -> String {
    "Unknown".to_string()
}

fn default_priority() -> String {
    "medium".to_string()
}

/// The target-list document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetList {
    #[serde(default)]
    pub casinos: Vec<CrawlTarget>,
}

impl TargetList {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }

    /// Targets to crawl after the optional region filter and limit, in the
    /// document's order.
    pub fn select(&self, region: Option<&str>, limit: Option<usize>) -> Vec<CrawlTarget> {
        let mut picked: Vec<CrawlTarget> = self
            .casinos
            .iter()
            .filter(|c| region.is_none_or(|r| c.region.eq_ignore_ascii_case(r)))
            .cloned()
            .collect();
        if let Some(n) = limit {
            picked.truncate(n);
        }
        picked
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
