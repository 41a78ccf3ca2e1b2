//! Per-run configuration.
//!
//! One `ScanConfig` object is built before the crawl starts and handed down
//! explicitly; nothing reads process-wide state after startup. Every field has
//! a serde default so a config file only needs the keys it overrides, and a
//! missing `--config` flag means pure defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Root per-run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub fetch: FetchSettings,
    pub detection: DetectionSettings,
    pub browser: BrowserSettings,
    pub crawl: CrawlSettings,
    pub output: OutputSettings,
}

impl ScanConfig {
    /// Load a configuration file, merging its keys over defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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
}

// ── Fetch ─────────────────────────────────────────────────────────────────

/// Plain HTTP fetch behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Per-attempt request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum attempts per URL, including the first.
    pub retry_attempts: u32,
    /// Base delay between retries; attempt N waits N × this.
    pub retry_delay_ms: u64,
    /// Pacing delay applied before the first attempt.
    pub rate_limit_delay_ms: u64,
    /// User-Agent header sent on every request.
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            rate_limit_delay_ms: 1000,
            user_agent: default_user_agent(),
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

// ── Detection ─────────────────────────────────────────────────────────────

/// Matching strictness and channel enablement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Provider terms searched for the provider-mention flag. Empty means
    /// derive them from the catalog's provider name.
    pub search_terms: Vec<String>,
    /// Patterns that mark a page region as provider context.
    pub provider_patterns: Vec<String>,
    /// Subpaths tried by the subpage-fallback channel.
    pub subpage_paths: Vec<String>,
    /// Aliases shorter than this never match in script/JSON content.
    pub min_alias_length: usize,
    /// Generate bare trailing-word variants for multi-word titles
    /// ("Goal Crash" → "crash"). Recall-favoring, costs precision.
    pub short_word_variants: bool,
    pub visible_text_channel: bool,
    pub script_channel: bool,
    pub attribute_channel: bool,
    pub subpage_fallback: bool,
    /// Probe site-search URLs when the fixed subpaths also found nothing.
    pub search_probe: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            search_terms: Vec::new(),
            provider_patterns: vec![
                "powered by".into(),
                "providers".into(),
                "software".into(),
                "game provider".into(),
            ],
            subpage_paths: vec![
                "/games".into(),
                "/slots".into(),
                "/casino".into(),
                "/providers".into(),
                "/games/slots".into(),
                "/casino/games".into(),
                "/slots/all".into(),
                "/game-providers".into(),
                "/software".into(),
                "/game-library".into(),
            ],
            min_alias_length: 4,
            short_word_variants: true,
            visible_text_channel: true,
            script_channel: true,
            attribute_channel: true,
            subpage_fallback: true,
            search_probe: true,
        }
    }
}

// ── Browser ───────────────────────────────────────────────────────────────

/// Script-executing fetch engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Use the browser engine instead of plain HTTP for the crawl.
    pub enabled: bool,
    /// Navigation timeout per page, in seconds.
    pub nav_timeout_secs: u64,
    /// Settle delay after load so script-rendered catalogs appear.
    pub settle_ms: u64,
    /// Concurrent browser sessions. Capped at 5 to keep the host responsive.
    pub max_sessions: usize,
    /// Subpaths visited after the main page, each best-effort.
    pub subpage_paths: Vec<String>,
    /// Explicit Chromium executable, overriding discovery.
    pub chromium_path: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            nav_timeout_secs: 30,
            settle_ms: 2000,
            max_sessions: 5,
            subpage_paths: vec![
                "/games".into(),
                "/slots".into(),
                "/casino".into(),
                "/providers".into(),
            ],
            chromium_path: None,
        }
    }
}

impl BrowserSettings {
    pub fn nav_timeout(&self) -> Duration {
        Duration::from_secs(self.nav_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Effective session cap.
    pub fn session_limit(&self) -> usize {
        self.max_sessions.clamp(1, 5)
    }
}

// ── Crawl ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Targets in flight at once on the plain-fetch path.
    pub parallel_workers: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self { parallel_workers: 5 }
    }
}

impl CrawlSettings {
    pub fn workers(&self) -> usize {
        self.parallel_workers.max(1)
    }
}

// ── Output ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory scan documents are written into.
    pub dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("scans"),
        }
    }
}
