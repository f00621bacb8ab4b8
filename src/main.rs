use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use cloud_price_sync::config::{parse_providers, SyncConfig, PREFLIGHT_KEYS};
use cloud_price_sync::destination::{HttpCatalog, OfflineCatalog};
use cloud_price_sync::diagnostics;
use cloud_price_sync::orchestrator::{cancellation, SyncOrchestrator};
use cloud_price_sync::snapshot::SnapshotWriter;
use cloud_price_sync::summary::{RunSummary, SyncState};
use cloud_price_sync::util::{env, logging};
use serde::Serialize;
use tracing::{error, info, warn};

const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Parser, Debug)]
#[command(
    name = "cloud-price-sync",
    version,
    about = "Sync cloud provider list prices into a price catalog"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Comma-separated providers to run (azure,gcp,aws); overrides SYNC_PROVIDERS
    #[arg(long, global = true)]
    providers: Option<String>,

    /// Namespace prefix for price codes and names; overrides PRICE_PREFIX
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// Page limit per source query; overrides MAX_PAGES
    #[arg(long, global = true)]
    max_pages: Option<u32>,

    /// Directory for JSON snapshots; overrides SYNC_OUTPUT_DIR
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Append logs to this file instead of stdout
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Write the final report as JSON to this path
    #[arg(long, global = true)]
    summary_json: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Fetch, normalize and upsert prices, then create bundles (default)
    Sync,
    /// Full run against an in-memory catalog; writes snapshots only
    Download,
    /// Fetch two pages of one Azure query and write raw + normalized samples
    Sample,
    /// Probe the destination and one page of every enabled provider
    Check,
}

impl Commands {
    fn needs_destination(self) -> bool {
        matches!(self, Commands::Sync | Commands::Check)
    }
}

fn apply_overrides(cfg: &mut SyncConfig, cli: &Cli) -> Result<()> {
    if let Some(raw) = &cli.providers {
        cfg.providers = parse_providers(raw).context("--providers")?;
    }
    if let Some(prefix) = &cli.prefix {
        cfg.prefix = prefix.trim().to_string();
    }
    if let Some(max_pages) = cli.max_pages {
        cfg.max_pages = max_pages;
    }
    if let Some(dir) = &cli.output_dir {
        cfg.output_dir = Some(dir.clone());
    }
    Ok(())
}

fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(report)?;
    std::fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    info!(file = %path.display(), "report written");
    Ok(())
}

async fn run_pipeline(cfg: &SyncConfig, offline: bool) -> Result<RunSummary> {
    let orchestrator = if offline {
        let catalog = Arc::new(OfflineCatalog::default());
        SyncOrchestrator::from_config(cfg, catalog)?
    } else {
        let catalog = Arc::new(HttpCatalog::from_config(cfg)?);
        SyncOrchestrator::from_config(cfg, catalog)?
    };

    let (cancel, token) = cancellation();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight work");
            cancel.cancel();
        }
    });

    let summary = orchestrator.run_with_cancel(token).await;
    watcher.abort();
    Ok(summary)
}

async fn dispatch(command: Commands, cli: &Cli, mut cfg: SyncConfig) -> Result<bool> {
    match command {
        Commands::Sync => {
            let summary = run_pipeline(&cfg, false).await?;
            if let Some(path) = &cli.summary_json {
                write_report(path, &summary)?;
            }
            Ok(summary.is_success())
        }
        Commands::Download => {
            if cfg.output_dir.is_none() {
                cfg.output_dir = Some(PathBuf::from(DEFAULT_OUTPUT_DIR));
            }
            let summary = run_pipeline(&cfg, true).await?;
            if let Some(path) = &cli.summary_json {
                write_report(path, &summary)?;
            }
            Ok(summary.state == SyncState::Done && !summary.snapshot_files.is_empty())
        }
        Commands::Sample => {
            let dir = cfg
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
            let writer = SnapshotWriter::new(dir, Local::now());
            let report = diagnostics::sample(&cfg, &writer).await?;
            info!(
                query = %report.query,
                fetched = report.fetched,
                normalized = report.normalized,
                failed = report.failed,
                "sample complete"
            );
            if let Some(path) = &cli.summary_json {
                write_report(path, &report)?;
            }
            Ok(report.normalized > 0)
        }
        Commands::Check => {
            let report = diagnostics::check(&cfg).await?;
            if let Some(path) = &cli.summary_json {
                write_report(path, &report)?;
            }
            Ok(report.all_ok())
        }
    }
}

async fn run(command: Commands, cli: &Cli) -> Result<bool> {
    let mut cfg = SyncConfig::from_env()?;
    apply_overrides(&mut cfg, cli)?;
    cfg.validate()?;
    dispatch(command, cli, cfg).await
}

#[tokio::main]
async fn main() -> ExitCode {
    env::init_env();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Sync);

    if let Err(err) = logging::init_tracing_to("info", cli.log_file.as_deref()) {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }
    env::bootstrap_cli("cloud-price-sync");

    let required: &[&str] = if command.needs_destination() {
        &["DESTINATION_URL"]
    } else {
        &[]
    };
    if let Err(err) = env::preflight_check("cloud-price-sync", required, PREFLIGHT_KEYS) {
        error!(error = %format!("{err:#}"), "preflight failed");
        return ExitCode::FAILURE;
    }

    match run(command, &cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            warn!(command = ?command, "finished without a usable result");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(command = ?command, error = %format!("{err:#}"), "command failed");
            ExitCode::FAILURE
        }
    }
}
