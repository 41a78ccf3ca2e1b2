// Copyright 2026 Reelscan Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use reelscan::cli;

#[derive(Parser)]
#[command(
    name = "reelscan",
    about = "Reelscan — provider catalog detection across casino sites",
    version,
    after_help = "Run 'reelscan <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every target and record catalog evidence per site
    Scan {
        /// Target list JSON file
        #[arg(long, short, default_value = "targets.json")]
        targets: PathBuf,

        /// Game catalog JSON file
        #[arg(long, short, default_value = "catalog.json")]
        catalog: PathBuf,

        /// Configuration file (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Scan at most N targets after filtering
        #[arg(long, short)]
        limit: Option<usize>,

        /// Only scan targets whose region matches (case-insensitive)
        #[arg(long, short)]
        region: Option<String>,

        /// Parallel workers, overriding the configured value
        #[arg(long)]
        concurrency: Option<usize>,

        /// Render pages in headless Chromium instead of plain HTTP
        #[arg(long, conflicts_with = "no_browser")]
        browser: bool,

        /// Never launch a browser even if the config enables one
        #[arg(long)]
        no_browser: bool,

        /// Directory for the scan document, overriding the configured value
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Validate inputs and list the selected targets without fetching
        #[arg(long)]
        dry_run: bool,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("REELSCAN_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("REELSCAN_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("REELSCAN_VERBOSE", "1");
    }
    if cli.no_color {
        std::env::set_var("REELSCAN_NO_COLOR", "1");
    }

    let result = match cli.command {
        Commands::Scan {
            targets,
            catalog,
            config,
            limit,
            region,
            concurrency,
            browser,
            no_browser,
            output,
            dry_run,
        } => {
            cli::scan::run(cli::scan::ScanArgs {
                targets,
                catalog,
                config,
                limit,
                region,
                concurrency,
                browser,
                no_browser,
                output,
                dry_run,
            })
            .await
        }
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "reelscan", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
