//! Crawl orchestration: many targets, bounded concurrency, one record each.
//!
//! Admission runs through a `buffer_unordered` stream so exactly `workers`
//! work units are in flight at any instant; results land in completion order.
//! Every unit runs in its own spawned task, so a panic or internal error is
//! caught at the unit boundary and downgraded to an Error-status record
//! instead of taking the batch down. The browser crawl additionally gates
//! open sessions behind a counting semaphore, since rendering is far heavier
//! than a plain fetch.
//!
//! Cancellation stops admission; in-flight units finish and targets that were
//! never admitted still get a record, so the output document stays 1:1 with
//! the input list.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::acquisition::{BrowserFetcher, FetchOutcome, HttpFetcher};
use crate::alias::AliasIndex;
use crate::catalog::{CrawlTarget, GameCatalog};
use crate::config::ScanConfig;
use crate::detection::{DetectionEngine, Detections};
use crate::progress::{self, ProgressSender, ScanEventKind};
use crate::renderer::Renderer;
use crate::report::{CasinoRecord, ScanDocument};

/// Cooperative stop signal. Cloned into everything that must observe it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared, cloneable context handed to every work unit.
#[derive(Clone)]
struct WorkCtx {
    config: Arc<ScanConfig>,
    engine: DetectionEngine,
    progress: Option<ProgressSender>,
    run_id: String,
    seq: Arc<AtomicU64>,
    completed: Arc<AtomicUsize>,
    total: usize,
}

/// Drives one scan run. Holds everything read-only that work units share:
/// configuration, the alias index, the detection engine.
pub struct Orchestrator {
    config: Arc<ScanConfig>,
    index: Arc<AliasIndex>,
    engine: DetectionEngine,
    progress: Option<ProgressSender>,
    run_id: String,
    seq: Arc<AtomicU64>,
    completed: Arc<AtomicUsize>,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(config: Arc<ScanConfig>, catalog: &GameCatalog) -> Self {
        let index = Arc::new(AliasIndex::build(catalog, &config.detection));
        let terms = if config.detection.search_terms.is_empty() {
            catalog.provider_terms()
        } else {
            config.detection.search_terms.clone()
        };
        let engine = DetectionEngine::new(index.clone(), config.detection.clone(), terms);

        Self {
            config,
            index,
            engine,
            progress: None,
            run_id: Uuid::new_v4().to_string(),
            seq: Arc::new(AtomicU64::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
            cancel: CancelToken::default(),
        }
    }

    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Token that stops admission of further targets when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Targets that have reached a terminal record so far. Monotonic.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Plain-HTTP crawl over all targets.
    pub async fn crawl(&self, targets: &[CrawlTarget]) -> Result<ScanDocument> {
        let started = Instant::now();
        self.announce(targets.len());

        let workers = self.config.crawl.workers();
        let records = self
            .drive(targets, workers, |ctx, target| scan_one(ctx, target))
            .await;

        self.conclude(&records, started);
        ScanDocument::assemble(targets.len(), self.index.len(), records)
    }

    /// Browser-rendering crawl. Open sessions are capped by the session gate
    /// even when more workers are admitted.
    pub async fn crawl_with_browser(
        &self,
        targets: &[CrawlTarget],
        renderer: Arc<dyn Renderer>,
    ) -> Result<ScanDocument> {
        let started = Instant::now();
        self.announce(targets.len());

        let workers = self.config.crawl.workers();
        let sessions = workers.min(self.config.browser.session_limit());
        let gate = Arc::new(Semaphore::new(sessions));
        let browser = BrowserFetcher::new(renderer, self.config.browser.clone());

        let records = self
            .drive(targets, workers, move |ctx, target| {
                scan_one_browser(ctx, target, browser.clone(), gate.clone())
            })
            .await;

        self.conclude(&records, started);
        ScanDocument::assemble(targets.len(), self.index.len(), records)
    }

    fn announce(&self, target_count: usize) {
        info!(
            run_id = %self.run_id,
            targets = target_count,
            catalog = self.index.len(),
            "scan run starting"
        );
        progress::emit(
            &self.progress,
            &self.run_id,
            &self.seq,
            ScanEventKind::RunStarted {
                target_count,
                catalog_size: self.index.len(),
            },
        );
    }

    fn conclude(&self, records: &[CasinoRecord], started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %self.run_id,
            records = records.len(),
            elapsed_ms,
            "scan run finished"
        );
        progress::emit(
            &self.progress,
            &self.run_id,
            &self.seq,
            ScanEventKind::RunFinished {
                records: records.len(),
                elapsed_ms,
            },
        );
    }

    /// Common admission loop for both crawl flavors. Yields exactly one
    /// record per target, completion order first, cancellation fill last.
    async fn drive<F, Fut>(
        &self,
        targets: &[CrawlTarget],
        workers: usize,
        make_unit: F,
    ) -> Vec<CasinoRecord>
    where
        F: Fn(WorkCtx, CrawlTarget) -> Fut,
        Fut: std::future::Future<Output = Result<CasinoRecord>> + Send + 'static,
    {
        let ctx = WorkCtx {
            config: self.config.clone(),
            engine: self.engine.clone(),
            progress: self.progress.clone(),
            run_id: self.run_id.clone(),
            seq: self.seq.clone(),
            completed: self.completed.clone(),
            total: targets.len(),
        };

        let finished: Vec<(usize, CasinoRecord)> =
            stream::iter(targets.iter().cloned().enumerate())
                .take_while(|_| {
                    let cancel = self.cancel.clone();
                    async move { !cancel.is_cancelled() }
                })
                .map(|(idx, target)| {
                    let ctx = ctx.clone();
                    let fallback = target.clone();
                    progress::emit(
                        &ctx.progress,
                        &ctx.run_id,
                        &ctx.seq,
                        ScanEventKind::TargetStarted {
                            name: target.name.clone(),
                            url: target.url.clone(),
                        },
                    );
                    debug!(target = %target.name, "target admitted");
                    let started = Instant::now();
                    let handle = tokio::spawn(make_unit(ctx.clone(), target));

                    async move {
                        let record = match handle.await {
                            Ok(Ok(record)) => record,
                            Ok(Err(e)) => failure_record(&fallback, e.to_string()),
                            Err(e) => {
                                failure_record(&fallback, format!("work unit panicked: {e}"))
                            }
                        };

                        let completed = ctx.completed.fetch_add(1, Ordering::SeqCst) + 1;
                        progress::emit(
                            &ctx.progress,
                            &ctx.run_id,
                            &ctx.seq,
                            ScanEventKind::TargetFinished {
                                name: record.name.clone(),
                                url: record.url.clone(),
                                access_status: record.access_status.to_string(),
                                entities: record.detected_entities.len(),
                                risk: record.risk_level.to_string(),
                                completed,
                                total: ctx.total,
                                elapsed_ms: started.elapsed().as_millis() as u64,
                            },
                        );
                        info!(
                            target = %record.name,
                            status = %record.access_status,
                            entities = record.detected_entities.len(),
                            completed,
                            total = ctx.total,
                            "target finished"
                        );
                        (idx, record)
                    }
                })
                .buffer_unordered(workers.max(1))
                .collect()
                .await;

        let mut records = Vec::with_capacity(targets.len());
        let mut admitted = vec![false; targets.len()];
        for (idx, record) in finished {
            admitted[idx] = true;
            records.push(record);
        }

        // Cancellation fill: never-admitted targets still get a record so the
        // document stays 1:1 with the input.
        if records.len() < targets.len() {
            warn!(
                skipped = targets.len() - records.len(),
                "admission stopped before all targets ran"
            );
            for (idx, target) in targets.iter().enumerate() {
                if !admitted[idx] {
                    let mut record = CasinoRecord::pending(target);
                    record
                        .notes
                        .push("Run cancelled before this target was scanned".to_string());
                    record.finalize();
                    records.push(record);
                }
            }
        }

        records
    }
}

/// Unit-boundary downgrade: whatever went wrong becomes an Error record.
fn failure_record(target: &CrawlTarget, message: String) -> CasinoRecord {
    warn!(target = %target.name, error = %message, "work unit failed");
    let mut record = CasinoRecord::pending(target);
    record.apply_outcome(&FetchOutcome::failed(&target.url, message));
    record.finalize();
    record
}

/// One target, plain-HTTP pipeline: fetch, detect, fall back to subpages and
/// the search probe when the landing page is silent, classify.
async fn scan_one(ctx: WorkCtx, target: CrawlTarget) -> Result<CasinoRecord> {
    let mut record = CasinoRecord::pending(&target);
    let fetcher = HttpFetcher::new(&ctx.config.fetch);

    let outcome = fetcher.fetch(&target.url).await;
    record.apply_outcome(&outcome);

    let final_url = outcome.final_url.clone();
    if let Some(html) = outcome.content {
        record.pages_scanned = 1;
        let mut det = ctx.engine.detect_async(html, final_url).await?;

        if det.is_empty() && ctx.engine.settings().subpage_fallback {
            let (sub, pages) = ctx.engine.sweep_subpages(&fetcher, &target.url).await?;
            record.pages_scanned += pages;
            if !sub.is_empty() {
                record
                    .notes
                    .push("Catalog entities found only on subpages".to_string());
            }
            det.merge_from(sub);
        }

        if det.is_empty() && ctx.engine.settings().search_probe {
            if let Some(term) = ctx.engine.primary_term() {
                let term = term.to_string();
                let (found, pages) = ctx.engine.search_probe(&fetcher, &target.url, &term).await?;
                record.pages_scanned += pages;
                if !found.is_empty() {
                    record
                        .notes
                        .push("Catalog entities surfaced via search probe".to_string());
                }
                det.merge_from(found);
            }
        }

        record.apply_detections(det);
    }

    record.finalize();
    Ok(record)
}

/// One target, browser pipeline. The session permit covers only the rendering
/// window; detection runs after the context is torn down.
async fn scan_one_browser(
    ctx: WorkCtx,
    target: CrawlTarget,
    browser: BrowserFetcher,
    gate: Arc<Semaphore>,
) -> Result<CasinoRecord> {
    let mut record = CasinoRecord::pending(&target);

    let permit = gate
        .acquire_owned()
        .await
        .context("browser session gate closed")?;
    let capture = browser.capture(&target.url).await;
    drop(permit);

    record.pages_scanned = capture.pages_visited;
    record.apply_outcome(&capture.outcome);

    if capture.outcome.status.is_online() {
        record
            .notes
            .push("Scanned with browser rendering".to_string());

        let mut det = Detections::default();
        let final_url = capture.outcome.final_url.clone();
        if let Some(html) = capture.outcome.content {
            det.merge_from(ctx.engine.detect_async(html, final_url).await?);
        }
        for page in capture.subpages {
            let page_url = HttpFetcher::join_path(&target.url, &page.path);
            det.merge_from(ctx.engine.detect_async(page.html, page_url).await?);
        }
        record.apply_detections(det);
    }

    record.finalize();
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::AccessStatus;
    use crate::catalog::Game;
    use crate::classify::RiskLevel;
    use crate::config::{DetectionSettings, FetchSettings};
    use crate::renderer::stub::StaticRenderer;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn catalog() -> GameCatalog {
        GameCatalog {
            provider: Some("Triple Cherry".into()),
            games: vec![
                Game {
                    title: "Goal Crash".into(),
                    aliases: Vec::new(),
                },
                Game {
                    title: "Bombuster".into(),
                    aliases: Vec::new(),
                },
            ],
        }
    }

    fn quick_config() -> ScanConfig {
        ScanConfig {
            fetch: FetchSettings {
                timeout_secs: 2,
                retry_attempts: 1,
                retry_delay_ms: 0,
                rate_limit_delay_ms: 0,
                ..FetchSettings::default()
            },
            detection: DetectionSettings {
                subpage_fallback: false,
                search_probe: false,
                ..DetectionSettings::default()
            },
            ..ScanConfig::default()
        }
    }

    fn target(name: &str, url: String) -> CrawlTarget {
        CrawlTarget {
            name: name.to_string(),
            url,
            region: "Europe".into(),
            country: "Malta".into(),
            priority: "medium".into(),
        }
    }

    fn orchestrator(config: ScanConfig) -> Orchestrator {
        Orchestrator::new(Arc::new(config), &catalog())
    }

    #[tokio::test]
    async fn test_one_record_per_target_in_completion_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body>Goal Crash</body></html>")
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let targets = vec![
            target("slow-casino", format!("{}/slow", server.uri())),
            target("fast-casino", format!("{}/fast", server.uri())),
            target("gone-casino", format!("{}/gone", server.uri())),
        ];

        let orch = orchestrator(quick_config());
        let doc = orch.crawl(&targets).await.unwrap();

        assert_eq!(doc.results.len(), 3);
        assert_eq!(doc.metadata.target_count, 3);
        assert_eq!(orch.completed(), 3);

        // The delayed target finishes after the instant ones.
        assert_eq!(doc.results.last().unwrap().name, "slow-casino");

        let by_name = |n: &str| doc.results.iter().find(|r| r.name == n).unwrap();
        assert_eq!(by_name("slow-casino").access_status, AccessStatus::Online);
        assert!(by_name("slow-casino").found);
        assert_eq!(by_name("gone-casino").access_status, AccessStatus::NotFound);
        assert!(!by_name("fast-casino").found);
    }

    #[tokio::test]
    async fn test_single_worker_serializes_the_fetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;

        let targets: Vec<CrawlTarget> = (0..3)
            .map(|i| target(&format!("t{i}"), format!("{}/p{i}", server.uri())))
            .collect();

        let mut config = quick_config();
        config.crawl.parallel_workers = 1;

        let started = Instant::now();
        let doc = orchestrator(config).crawl(&targets).await.unwrap();
        assert_eq!(doc.results.len(), 3);
        // Serial admission cannot beat three stacked delays.
        assert!(started.elapsed() >= Duration::from_millis(450));
    }

    #[tokio::test]
    async fn test_panicking_unit_becomes_an_error_record() {
        let targets = vec![
            target("boom", "https://boom.example".into()),
            target("calm", "https://calm.example".into()),
        ];
        let orch = orchestrator(quick_config());

        let records = orch
            .drive(&targets, 2, |_, target| async move {
                if target.name == "boom" {
                    panic!("synthetic unit failure");
                }
                let mut record = CasinoRecord::pending(&target);
                record.finalize();
                Ok(record)
            })
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(orch.completed(), 2);

        let boom = records.iter().find(|r| r.name == "boom").unwrap();
        assert_eq!(boom.access_status, AccessStatus::Error);
        assert!(boom.detected_entities.is_empty());
        assert_eq!(boom.risk_level, RiskLevel::High);
    }

    #[tokio::test]
    async fn test_failing_unit_becomes_an_error_record() {
        let targets = vec![target("sore", "https://sore.example".into())];
        let orch = orchestrator(quick_config());

        let records = orch
            .drive(&targets, 1, |_, _| async move {
                anyhow::bail!("downstream blew up")
            })
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].access_status, AccessStatus::Error);
        assert!(records[0]
            .notes
            .iter()
            .any(|n| n.contains("Could not access")));
    }

    #[tokio::test]
    async fn test_cancellation_stops_admission_but_fills_records() {
        let targets: Vec<CrawlTarget> = (0..4)
            .map(|i| target(&format!("t{i}"), format!("https://t{i}.example")))
            .collect();
        let orch = orchestrator(quick_config());
        let token = orch.cancel_token();

        let records = orch
            .drive(&targets, 1, move |_, target| {
                let token = token.clone();
                async move {
                    // First admitted unit pulls the plug.
                    token.cancel();
                    let mut record = CasinoRecord::pending(&target);
                    record.finalize();
                    Ok(record)
                }
            })
            .await;

        assert_eq!(records.len(), 4);
        let cancelled = records
            .iter()
            .filter(|r| r.notes.iter().any(|n| n.contains("cancelled")))
            .count();
        assert_eq!(cancelled, 3);
        assert_eq!(orch.completed(), 1);
        assert!(records[1..]
            .iter()
            .all(|r| r.access_status == AccessStatus::Unknown));
    }

    #[tokio::test]
    async fn test_progress_events_carry_the_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let (tx, mut rx) = progress::channel();
        let orch = orchestrator(quick_config()).with_progress(tx);
        let targets = vec![target("one", format!("{}/x", server.uri()))];
        orch.crawl(&targets).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.run_id, orch.run_id());
            kinds.push(event.event);
        }
        assert!(matches!(kinds.first(), Some(ScanEventKind::RunStarted { .. })));
        assert!(matches!(kinds.last(), Some(ScanEventKind::RunFinished { .. })));
        assert!(kinds
            .iter()
            .any(|k| matches!(k, ScanEventKind::TargetFinished { completed: 1, .. })));
    }

    #[tokio::test]
    async fn test_browser_crawl_caps_open_sessions() {
        let mut renderer = StaticRenderer::new().with_nav_delay(Duration::from_millis(50));
        for i in 0..4 {
            renderer = renderer.with_page(
                &format!("https://t{i}.example"),
                "<html><body>Goal Crash</body></html>",
            );
        }
        let peak = renderer.peak.clone();

        let mut config = quick_config();
        config.browser.enabled = true;
        config.browser.settle_ms = 0;
        config.browser.max_sessions = 2;
        config.browser.subpage_paths = Vec::new();
        config.crawl.parallel_workers = 4;

        let targets: Vec<CrawlTarget> = (0..4)
            .map(|i| target(&format!("t{i}"), format!("https://t{i}.example")))
            .collect();

        let orch = orchestrator(config);
        let doc = orch
            .crawl_with_browser(&targets, Arc::new(renderer))
            .await
            .unwrap();

        assert_eq!(doc.results.len(), 4);
        assert!(doc.results.iter().all(|r| r.found));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_browser_crawl_reads_subpage_content() {
        let renderer = StaticRenderer::new()
            .with_page("https://t.example", "<html><body>nothing here</body></html>")
            .with_page(
                "https://t.example/games",
                "<html><body>Bombuster</body></html>",
            );

        let mut config = quick_config();
        config.browser.enabled = true;
        config.browser.settle_ms = 0;
        config.browser.subpage_paths = vec!["/games".into()];

        let orch = orchestrator(config);
        let targets = vec![target("t", "https://t.example".into())];
        let doc = orch
            .crawl_with_browser(&targets, Arc::new(renderer))
            .await
            .unwrap();

        let record = &doc.results[0];
        assert_eq!(record.pages_scanned, 2);
        assert_eq!(record.detected_entities, vec!["Bombuster".to_string()]);
        assert!(record.notes.iter().any(|n| n.contains("browser rendering")));
    }

    #[tokio::test]
    async fn test_empty_target_list_yields_an_empty_document() {
        let doc = orchestrator(quick_config()).crawl(&[]).await.unwrap();
        assert!(doc.results.is_empty());
        assert_eq!(doc.metadata.target_count, 0);
        assert_eq!(doc.metadata.catalog_size, 2);
    }
}
