//! Renderer abstraction for browser-based page loading.
//!
//! The `Renderer` / `RenderContext` traits abstract over the script-executing
//! engine (Chromium via chromiumoxide) so the browser crawl path can be
//! exercised in tests without a real browser. One context is one isolated
//! session; the browser fetch layer opens a context per target and closes it
//! on every exit path.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;

/// Result of navigating a context to a URL.
#[derive(Debug, Clone)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// HTTP status code of the main document.
    pub status: u16,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new isolated context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context for loading pages.
#[async_trait]
pub trait RenderContext: Send {
    /// Navigate to a URL with a timeout, letting scripts run.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Full page HTML after rendering.
    async fn get_html(&self) -> Result<String>;
    /// Close this context. Must be called on every exit path.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A no-op renderer used when Chromium is unavailable.
///
/// Context creation fails, which the orchestrator's work-unit boundary turns
/// into error-status records; the plain-fetch crawl is unaffected.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available, HTTP-only mode"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
