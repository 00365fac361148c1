mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use cadence_core::config::{self, Config};
use cadence_store::LocalStore;

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    config::load_dotenv();
    let args = CliArgs::parse();

    let mut config = Config::for_profile(&args.profile);
    if let Some(path) = &args.data_path {
        config.store.data_path = path.clone();
    }
    debug!(path = %config.store.data_path.display(), profile = config.profile_label(), "opening store");

    // Same base interval as the worker, so intervals are validated identically.
    let store = LocalStore::from_settings(&config.store, &config.scheduler).with_context(|| {
        format!("failed to open store at {}", config.store.data_path.display())
    })?;

    let out = commands::execute(&store, args.command).await?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
