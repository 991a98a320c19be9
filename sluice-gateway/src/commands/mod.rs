//! Commands module
//!
//! Defines all CLI commands and their handlers. Every command starts with a
//! maintenance pass (stale processes, retention); the mutating commands also
//! run a promotion sweep so waiting work is picked up without a daemon.

mod cancel;
mod report;
mod submit;
mod worker;

use anyhow::Result;
use clap::Subcommand;
use sluice_core::config::GatewayConfig;
use sqlx::SqlitePool;

use crate::service::supervisor::Supervisor;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit one prompt to a model
    Submit {
        /// Prompt text; read from stdin when omitted
        prompt: Option<String>,

        /// Model alias (e.g. fast, think)
        #[arg(short, long, default_value = "fast")]
        model: String,

        /// Free-text tag attached to the job
        #[arg(short, long, default_value = "")]
        label: String,

        /// Submit even if an identical prompt is already queued or running
        #[arg(long)]
        force: bool,
    },
    /// Submit several prompts as one batch, spread across the model's bucket
    Batch {
        /// Prompt texts (or use --file)
        prompts: Vec<String>,

        /// Model alias requested for every prompt in the batch
        #[arg(short, long, default_value = "fast")]
        model: String,

        /// Free-text tag attached to every job in the batch
        #[arg(short, long, default_value = "")]
        label: String,

        /// Read prompts from a file, one per line
        #[arg(short, long)]
        file: Option<std::path::PathBuf>,
    },
    /// Per-model running counts and health
    Status {
        /// Emit JSON instead of the human listing
        #[arg(long)]
        json: bool,
    },
    /// List active jobs; with filters, list matching jobs in any state
    Jobs {
        /// Filter by status (waiting, running, done, failed)
        #[arg(long)]
        status: Option<String>,

        /// Filter by model alias
        #[arg(short, long)]
        model: Option<String>,

        /// Filter by batch id
        #[arg(short, long)]
        batch: Option<String>,

        /// Filter by label
        #[arg(short, long)]
        label: Option<String>,

        /// Emit JSON instead of the human listing
        #[arg(long)]
        json: bool,
    },
    /// Aggregate statistics per model
    Stats {
        /// Restrict to a recent window, e.g. 30m, 1h, 24h, 2d
        #[arg(long)]
        last: Option<String>,

        /// Emit JSON instead of the human listing
        #[arg(long)]
        json: bool,
    },
    /// Recent failures with captured diagnostics
    Errors {
        /// Restrict to a recent window, e.g. 30m, 1h, 24h, 2d
        #[arg(long)]
        last: Option<String>,

        /// Maximum failures to list
        #[arg(long, default_value_t = 20)]
        limit: i64,

        /// Emit JSON instead of the human listing
        #[arg(long)]
        json: bool,
    },
    /// Current pacing state per model
    Pacing {
        /// Emit JSON instead of the human listing
        #[arg(long)]
        json: bool,
    },
    /// Cancel jobs by job id, batch id, or ALL --model <alias>
    Cancel {
        /// Job id, batch id, or the literal ALL
        target: String,

        /// Model alias, required with ALL
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Claim and execute one job (spawned internally by the sweep)
    #[command(hide = true)]
    Worker {
        job_id: i64,
    },
}

/// Handle a CLI command
pub async fn handle_command(
    command: Commands,
    config: &GatewayConfig,
    pool: &SqlitePool,
) -> Result<()> {
    let supervisor = Supervisor::new(pool, config);
    supervisor.maintain().await?;

    match command {
        Commands::Submit {
            prompt,
            model,
            label,
            force,
        } => submit::handle_submit(config, pool, prompt, &model, &label, force).await,
        Commands::Batch {
            prompts,
            model,
            label,
            file,
        } => submit::handle_batch(config, pool, prompts, &model, &label, file).await,
        Commands::Status { json } => report::handle_status(config, pool, json).await,
        Commands::Jobs {
            status,
            model,
            batch,
            label,
            json,
        } => {
            report::handle_jobs(
                config,
                pool,
                status.as_deref(),
                model.as_deref(),
                batch,
                label,
                json,
            )
            .await
        }
        Commands::Stats { last, json } => {
            report::handle_stats(config, pool, last.as_deref(), json).await
        }
        Commands::Errors { last, limit, json } => {
            report::handle_errors(pool, last.as_deref(), limit, json).await
        }
        Commands::Pacing { json } => report::handle_pacing(config, pool, json).await,
        Commands::Cancel { target, model } => {
            cancel::handle_cancel(config, pool, &target, model.as_deref()).await
        }
        Commands::Worker { job_id } => worker::handle_worker(config, pool, job_id).await,
    }
}
