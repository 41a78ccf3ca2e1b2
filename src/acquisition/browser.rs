//! Browser-backed page fetching for script-rendered catalogs.
//!
//! Same outcome contract as the plain HTTP path, but the page loads in a
//! rendering context first so catalogs injected by JavaScript are visible.
//! After the main page, a small fixed list of subpaths is visited best-effort
//! in the same context; each failure is logged and skipped. The context is
//! closed on every exit path.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::acquisition::http::{AccessStatus, FetchOutcome, HttpFetcher};
use crate::config::BrowserSettings;
use crate::renderer::{RenderContext, Renderer};

/// One captured subpage.
#[derive(Debug, Clone)]
pub struct PageCapture {
    /// Subpath relative to the target, e.g. "/games".
    pub path: String,
    pub html: String,
}

/// Everything one browser visit produced: the main-page outcome plus any
/// subpage bodies captured along the way.
#[derive(Debug)]
pub struct BrowserCapture {
    pub outcome: FetchOutcome,
    pub subpages: Vec<PageCapture>,
    /// Pages actually loaded (main + subpages).
    pub pages_visited: u32,
}

/// Renderer-backed fetcher. Cheap to clone; each `capture` opens its own
/// isolated context.
#[derive(Clone)]
pub struct BrowserFetcher {
    renderer: Arc<dyn Renderer>,
    settings: BrowserSettings,
}

impl BrowserFetcher {
    pub fn new(renderer: Arc<dyn Renderer>, settings: BrowserSettings) -> Self {
        Self { renderer, settings }
    }

    /// Load the target's main page and its candidate subpaths in one session.
    ///
    /// Total page visits are bounded by 1 + the configured subpath count.
    pub async fn capture(&self, url: &str) -> BrowserCapture {
        let mut outcome = FetchOutcome::pending(url);
        outcome.attempts = 1;

        let mut ctx = match self.renderer.new_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(url, error = %format!("{e:#}"), "browser session unavailable");
                outcome.status = AccessStatus::Error;
                outcome.error = Some(format!("browser session: {e:#}"));
                return BrowserCapture {
                    outcome,
                    subpages: Vec::new(),
                    pages_visited: 0,
                };
            }
        };

        let (outcome, subpages, pages_visited) = self.run_in_context(ctx.as_mut(), outcome).await;

        // Teardown runs on failure paths too.
        if let Err(e) = ctx.close().await {
            debug!(url, error = %format!("{e:#}"), "context close failed");
        }

        BrowserCapture {
            outcome,
            subpages,
            pages_visited,
        }
    }

    async fn run_in_context(
        &self,
        ctx: &mut dyn RenderContext,
        mut outcome: FetchOutcome,
    ) -> (FetchOutcome, Vec<PageCapture>, u32) {
        let url = outcome.url.clone();
        let timeout_ms = self.settings.nav_timeout().as_millis() as u64;
        let mut subpages = Vec::new();
        let mut pages_visited = 0u32;

        match ctx.navigate(&url, timeout_ms).await {
            Ok(nav) => {
                outcome.final_url = nav.final_url;
                pages_visited += 1;

                // Let script-rendered catalogs settle before reading.
                tokio::time::sleep(self.settings.settle()).await;

                match ctx.get_html().await {
                    Ok(html) => {
                        info!(url, load_ms = nav.load_time_ms, "rendered");
                        outcome.status = AccessStatus::Online;
                        outcome.content = Some(html);
                    }
                    Err(e) => {
                        outcome.status = AccessStatus::Error;
                        outcome.error = Some(format!("content read: {e:#}"));
                        return (outcome, subpages, pages_visited);
                    }
                }

                for path in &self.settings.subpage_paths {
                    let sub_url = HttpFetcher::join_path(&url, path);
                    match ctx.navigate(&sub_url, timeout_ms).await {
                        Ok(_) => {
                            tokio::time::sleep(self.settings.settle()).await;
                            match ctx.get_html().await {
                                Ok(html) => {
                                    pages_visited += 1;
                                    subpages.push(PageCapture {
                                        path: path.clone(),
                                        html,
                                    });
                                }
                                Err(e) => {
                                    debug!(url = sub_url, error = %format!("{e:#}"), "subpage read failed")
                                }
                            }
                        }
                        // One subpage failing aborts neither the target nor
                        // the remaining subpaths.
                        Err(e) => {
                            debug!(url = sub_url, error = %format!("{e:#}"), "subpage skipped")
                        }
                    }
                }
            }
            Err(e) => {
                let msg = format!("{e:#}");
                outcome.status = if msg.contains("timed out") {
                    AccessStatus::Timeout
                } else {
                    AccessStatus::Error
                };
                warn!(url, error = %msg, "navigation failed");
                outcome.error = Some(msg);
            }
        }

        (outcome, subpages, pages_visited)
    }
}
