//! `reelscan scan` command: crawl the target list and write the scan document.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::catalog::{GameCatalog, TargetList};
use crate::cli::output;
use crate::config::ScanConfig;
use crate::orchestrator::Orchestrator;
use crate::progress::{self, ProgressReceiver, ScanEventKind};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use crate::report;

pub struct ScanArgs {
    pub targets: PathBuf,
    pub catalog: PathBuf,
    pub config: Option<PathBuf>,
    pub limit: Option<usize>,
    pub region: Option<String>,
    pub concurrency: Option<usize>,
    pub browser: bool,
    pub no_browser: bool,
    pub output: Option<PathBuf>,
    pub dry_run: bool,
}

pub async fn run(args: ScanArgs) -> Result<()> {
    init_tracing();

    let mut config = match &args.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    if let Some(workers) = args.concurrency {
        config.crawl.parallel_workers = workers;
    }
    if let Some(dir) = args.output {
        config.output.dir = dir;
    }
    if args.browser {
        config.browser.enabled = true;
    }
    if args.no_browser {
        config.browser.enabled = false;
    }

    let catalog = GameCatalog::load(&args.catalog)?;
    if catalog.is_empty() {
        bail!("game catalog {} has no entries", args.catalog.display());
    }
    let list = TargetList::load(&args.targets)?;
    let targets = list.select(args.region.as_deref(), args.limit);
    if targets.is_empty() {
        bail!(
            "no targets selected from {} (region/limit filtered everything out)",
            args.targets.display()
        );
    }

    // Dry run stops after input validation and selection; nothing is fetched.
    if args.dry_run {
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "dry_run": true,
                "catalog_size": catalog.len(),
                "workers": config.crawl.workers(),
                "browser": config.browser.enabled,
                "targets": targets
                    .iter()
                    .map(|t| serde_json::json!({
                        "name": t.name,
                        "url": t.url,
                        "region": t.region,
                    }))
                    .collect::<Vec<_>>(),
            }));
        } else if !output::is_quiet() {
            println!(
                "Would scan {} targets against {} catalog entries:",
                targets.len(),
                catalog.len()
            );
            for t in &targets {
                println!("  {} [{}] {}", t.name, t.region, t.url);
            }
        }
        return Ok(());
    }

    info!(
        targets = targets.len(),
        catalog = catalog.len(),
        workers = config.crawl.workers(),
        browser = config.browser.enabled,
        "scan starting"
    );

    let config = Arc::new(config);
    let (tx, rx) = progress::channel();
    let orchestrator = Orchestrator::new(config.clone(), &catalog).with_progress(tx);

    // Ctrl-C stops admitting new targets; in-flight ones finish and the
    // document is still written with every record accounted for.
    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("  Interrupted. Letting in-flight targets finish...");
            cancel.cancel();
        }
    });

    let bar = spawn_progress_task(rx, targets.len());

    let document = if config.browser.enabled {
        match ChromiumRenderer::new(
            config.browser.chromium_path.as_deref(),
            &config.fetch.user_agent,
        )
        .await
        {
            Ok(renderer) => {
                let renderer: Arc<dyn Renderer> = Arc::new(renderer);
                let doc = orchestrator
                    .crawl_with_browser(&targets, renderer.clone())
                    .await;
                if let Err(e) = renderer.shutdown().await {
                    debug!(error = %e, "browser shutdown failed");
                }
                doc?
            }
            Err(e) => {
                warn!(error = %e, "browser unavailable, falling back to plain fetch");
                orchestrator.crawl(&targets).await?
            }
        }
    } else {
        orchestrator.crawl(&targets).await?
    };

    if let Some(task) = bar {
        task.await.ok();
    }

    let path = report::write_document(&document, &config.output.dir)?;
    if !output::is_json() && !output::is_quiet() {
        println!("Report written to {}", path.display());
    }

    if output::is_json() {
        output::print_json(&serde_json::to_value(&document)?);
    } else if !output::is_quiet() {
        print!("{}", report::summarize(&document));
    }

    Ok(())
}

/// Logs go to stderr so `--json` leaves stdout machine-readable.
fn init_tracing() {
    let directive = if output::is_verbose() {
        "reelscan=debug"
    } else {
        "reelscan=info"
    };
    let filter = EnvFilter::from_default_env().add_directive(directive.parse().unwrap());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!output::is_no_color());
    if output::is_json() {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Render a progress bar off the broadcast stream. Returns `None` in quiet
/// and JSON modes, where the bar would pollute the output.
fn spawn_progress_task(
    mut rx: ProgressReceiver,
    total: usize,
) -> Option<tokio::task::JoinHandle<()>> {
    if output::is_quiet() || output::is_json() {
        return None;
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    Some(tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match rx.recv().await {
                Ok(event) => match event.event {
                    ScanEventKind::TargetFinished {
                        name, completed, ..
                    } => {
                        bar.set_position(completed as u64);
                        bar.set_message(name);
                    }
                    ScanEventKind::Warning { message } => {
                        bar.println(message);
                    }
                    ScanEventKind::RunFinished { .. } => {
                        bar.finish_and_clear();
                        break;
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    bar.finish_and_clear();
                    break;
                }
            }
        }
    }))
}
