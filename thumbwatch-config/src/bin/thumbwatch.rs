use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use thumbwatch_config::{ConfigSource, ThumbwatchConfig};
use thumbwatch_core::{Event, EventKind, ThumbWatcher};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "thumbwatch",
    about = "Keep gallery thumbnails in sync with watched directories"
)]
struct Cli {
    /// TOML or JSON configuration file (overrides $THUMBWATCH_CONFIG_PATH)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Skip the initial catch-up walk over existing files
    #[arg(long)]
    no_reconcile: bool,

    /// Gallery roots to watch (replace the configured ones)
    roots: Vec<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<(ThumbwatchConfig, ConfigSource)> {
    let (mut config, source) = match &cli.config {
        Some(path) => (
            ThumbwatchConfig::load_from_file(path)?,
            ConfigSource::Explicit(path.clone()),
        ),
        None => ThumbwatchConfig::load_from_env()?,
    };

    if !cli.roots.is_empty() {
        config.roots = cli.roots.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok((config, source))
}

async fn log_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match event.kind {
            EventKind::Error => warn!(
                target: "thumbwatch::events",
                root = %event.root.display(),
                path = %event.path.display(),
                error = %event.error.as_ref().map(|err| err.to_string()).unwrap_or_default(),
                "error"
            ),
            kind => info!(
                target: "thumbwatch::events",
                root = %event.root.display(),
                path = %event.path.display(),
                "{kind}"
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_loaded = dotenvy::dotenv().is_ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if env_loaded {
        info!("loaded .env file");
    }

    let (config, source) = load_config(&cli)?;
    info!(source = %source, "configuration loaded");

    if config.roots.is_empty() {
        bail!("no roots to watch: pass them as arguments or set `roots` in the configuration");
    }

    let prefs = config.thumbnail_prefs();
    let retry = config.retry_policy();
    let dir_mode = format!("{:o}", prefs.dir_mode());
    info!(
        thumbnail.width = prefs.size().0,
        thumbnail.height = prefs.size().1,
        thumbnail.algorithm = %prefs.algorithm(),
        thumbnail.dir_mode = %dir_mode,
        retry.step_ms = retry.step().as_millis() as u64,
        retry.budget_ms = retry.budget().as_millis() as u64,
        retry.max_attempts = retry.max_attempts(),
        layout.thumb_dir = %config.layout.thumb_dir_name,
        layout.max_depth = config.layout.max_depth,
        "thumbnail configuration in effect"
    );

    let watcher = ThumbWatcher::builder()
        .prefs(prefs)
        .retry(retry)
        .policy(config.layout_policy())
        .build();

    let mut consumers = JoinSet::new();
    for root in &config.roots {
        let root = root
            .canonicalize()
            .with_context(|| format!("cannot watch {}", root.display()))?;
        let (tx, rx) = mpsc::channel(config.event_buffer);
        watcher
            .add_root(&root, tx)
            .await
            .with_context(|| format!("failed to watch {}", root.display()))?;
        consumers.spawn(log_events(rx));

        if !cli.no_reconcile {
            match watcher.reconcile(&root).await {
                Ok(report) => info!(
                    root = %root.display(),
                    subdirs_watched = report.subdirs_watched,
                    thumbnails_scheduled = report.thumbnails_scheduled,
                    thumbnails_present = report.thumbnails_present,
                    "catch-up complete"
                ),
                Err(err) => error!(root = %root.display(), error = %err, "catch-up failed"),
            }
        }
    }

    info!(roots = config.roots.len(), "watching; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!(in_flight = watcher.jobs_in_flight(), "shutting down");
    watcher.shutdown().await;
    watcher.wait_for_jobs().await;
    while consumers.join_next().await.is_some() {}

    Ok(())
}
