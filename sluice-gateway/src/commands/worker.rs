//! Worker command handler
//!
//! Hidden subcommand spawned by the promotion sweep. Claims the job, runs
//! the backend, reports the outcome, and sweeps again. Prints nothing — the
//! spawning side already detached from it.

use anyhow::Result;
use sluice_core::config::GatewayConfig;
use sqlx::SqlitePool;

use crate::service::supervisor::Supervisor;

pub async fn handle_worker(
    config: &GatewayConfig,
    pool: &SqlitePool,
    job_id: i64,
) -> Result<()> {
    let supervisor = Supervisor::new(pool, config);
    supervisor.run_job(job_id).await?;
    Ok(())
}
