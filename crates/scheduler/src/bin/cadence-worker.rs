//! cadence-worker: runs the alert scheduler against the local store.
//!
//! Configuration comes from the environment (`CADENCE_*`, optionally from a
//! `.env` file); command-line flags override individual settings.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadence_core::config::{self, Config};
use cadence_scheduler::{Scheduler, StaticEvaluator};
use cadence_store::LocalStore;

// ── CLI ─────────────────────────────────────────────────────────────

/// Alert definition scheduler worker.
#[derive(Parser, Debug)]
#[command(name = "cadence-worker", version, about)]
struct Cli {
    /// Config profile; keys are looked up as {PROFILE}_{KEY} first.
    #[arg(long, env = "CADENCE_PROFILE", default_value = "")]
    profile: String,

    /// JSON file backing the alert definition store.
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// Tick period in seconds.
    #[arg(long)]
    base_interval: Option<u64>,

    /// Evaluation attempts per due tick.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Per-attempt evaluation timeout in seconds.
    #[arg(long)]
    eval_timeout: Option<u64>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.data_path {
            config.store.data_path = path.clone();
        }
        if let Some(secs) = self.base_interval {
            config.scheduler.base_interval_seconds = secs;
        }
        if let Some(attempts) = self.max_attempts {
            config.scheduler.max_attempts = attempts;
        }
        if let Some(secs) = self.eval_timeout {
            config.scheduler.eval_timeout_seconds = secs;
        }
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    config::load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::for_profile(&cli.profile);
    cli.apply(&mut config);
    config.log_summary();

    let store = LocalStore::from_settings(&config.store, &config.scheduler).with_context(|| {
        format!("failed to open store at {}", config.store.data_path.display())
    })?;

    let scheduler = Scheduler::builder(Arc::new(store), Arc::new(StaticEvaluator))
        .settings(&config.scheduler)
        .on_eval_applied(|key, at| debug!(rule = %key, tick_at = %at, "evaluation applied"))
        .on_stop_applied(|key| info!(rule = %key, "rule stopped"))
        .build()
        .context("invalid scheduler configuration")?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                signal.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for shutdown signal"),
        }
    });

    info!(
        base_interval = ?Duration::from_secs(config.scheduler.base_interval_seconds),
        "cadence-worker starting"
    );
    scheduler.run(shutdown).await;

    let metrics = scheduler.metrics();
    info!(
        ticks = metrics.ticks,
        evaluation_failures = metrics.evaluation_failures,
        ticks_skipped = metrics.ticks_skipped,
        "cadence-worker exited cleanly"
    );
    Ok(())
}
