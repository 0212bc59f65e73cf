//! Huntsman - automated resource hunter
//!
//! Keeps a media library complete: scans what is on disk, reconciles it
//! against subscribed titles into a missing-episode ledger, then hunts the
//! configured forum sites for whatever is still outstanding. Runs as a
//! scheduled daemon by default; `run-once`, `search` and `grab` cover
//! one-shot and operator-driven use.

mod cli;
mod config;
mod db;
mod error;
mod jobs;
mod reconcile;
mod services;
mod site;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{CliOptions, Command};
use crate::config::{Config, MediaKind};
use crate::db::Database;
use crate::site::{SessionStore, SiteDriver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let options = CliOptions::from_args()?;
    let config = Config::from_env()?;

    init_tracing();

    let db = Database::connect(&config.database_path).await?;
    tracing::info!("Database connected");

    match options.command {
        Command::Daemon => run_daemon(config, db).await,
        Command::RunOnce => jobs::run_pipeline(&config, &db).await,
        Command::Search { kind, title, year } => run_search(&config, kind, &title, year).await,
        Command::Grab { kind, link } => run_grab(&config, kind, &link).await,
    }
}

/// Console output by default, JSON when `LOG_FORMAT=json`. Level overrides
/// come from `RUST_LOG` as usual.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "huntsman=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Run one pass immediately, then keep running on the configured interval
/// until interrupted.
async fn run_daemon(config: Config, db: Database) -> anyhow::Result<()> {
    tracing::info!("Starting huntsman");

    if let Err(e) = jobs::run_pipeline(&config, &db).await {
        tracing::error!(error = %e, "initial pipeline pass failed");
    }

    let mut scheduler = jobs::start_scheduler(config, db).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    scheduler.shutdown().await?;
    Ok(())
}

fn driver_for(config: &Config, kind: MediaKind) -> anyhow::Result<SiteDriver> {
    let Some(profile) = config.site(kind) else {
        bail!("no {kind} site configured");
    };
    SiteDriver::new(
        profile.clone(),
        SessionStore::new(&config.session_cache_dir),
        Duration::from_secs(config.http_timeout_secs),
    )
}

async fn run_search(
    config: &Config,
    kind: MediaKind,
    title: &str,
    year: Option<i64>,
) -> anyhow::Result<()> {
    let driver = driver_for(config, kind)?;
    let candidates = jobs::manual::search_once(
        &driver,
        title,
        year,
        &config.preferred_resolution,
        &config.fallback_resolution,
        &config.exclude_keywords,
    )
    .await?;

    if candidates.is_empty() {
        println!("no matching results");
        return Ok(());
    }
    for candidate in &candidates {
        let resolution = candidate.resolution.as_deref().unwrap_or("?");
        let size = candidate
            .size_gb
            .map(|s| format!("{s:.2} GB"))
            .unwrap_or_else(|| "unknown size".to_string());
        println!("{}  [{resolution}, {size}]", candidate.title);
        println!("    {}", candidate.link);
    }
    Ok(())
}

async fn run_grab(config: &Config, kind: MediaKind, link: &str) -> anyhow::Result<()> {
    let driver = driver_for(config, kind)?;
    let landed = jobs::manual::grab(&driver, link, Path::new(&config.torrent_dir)).await?;

    if landed.is_empty() {
        println!("no attachments found");
        return Ok(());
    }
    for path in &landed {
        println!("{}", path.display());
    }
    Ok(())
}
