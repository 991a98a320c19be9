//! Sluice gateway
//!
//! Local admission-control gateway that serializes and throttles prompts from
//! many independent invocations into a small set of rate-limited model
//! backends. Every call is tracked as a durable job in a sqlite store; there
//! is no daemon — each invocation runs maintenance and a promotion sweep
//! before handling its own command.

mod commands;
mod db;
mod repository;
mod runner;
mod service;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Commands;
use sluice_core::config::GatewayConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Admission gateway for rate-limited LLM backends", long_about = None)]
struct Cli {
    /// Store location override
    #[arg(long, env = "SLUICE_DB", global = true)]
    db: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = GatewayConfig::load().context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let pool = db::open(&config)
        .await
        .context("Failed to open job store")?;

    commands::handle_command(cli.command, &config, &pool).await
}
