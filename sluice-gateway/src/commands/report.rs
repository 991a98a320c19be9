//! Reporting command handlers
//!
//! Thin, read-only views over the store: status, jobs, stats, errors, and
//! pacing. All data comes from the reporting service; this module only
//! formats.

use anyhow::{Result, bail};
use chrono::Utc;
use colored::*;
use sluice_core::config::GatewayConfig;
use sluice_core::domain::job::JobStatus;
use sluice_core::dto::report::ModelHealth;
use sqlx::SqlitePool;

use crate::repository::job::JobFilter;
use crate::service::report;

fn parse_status(s: &str) -> Result<JobStatus> {
    match s {
        "waiting" => Ok(JobStatus::Waiting),
        "running" => Ok(JobStatus::Running),
        "done" => Ok(JobStatus::Done),
        "failed" => Ok(JobStatus::Failed),
        other => bail!("unknown status '{}': expected waiting, running, done, or failed", other),
    }
}

/// Per-model running counts and health
pub async fn handle_status(
    config: &GatewayConfig,
    pool: &SqlitePool,
    json: bool,
) -> Result<()> {
    let statuses = report::model_status(pool, config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    println!("{}", "Model status:".bold());
    for status in statuses {
        let health = colorize_health(status.health);
        println!(
            "  {:<8} {:<24} running: {:<3} {}",
            status.alias.cyan(),
            status.model.dimmed(),
            status.running,
            health
        );
    }

    Ok(())
}

/// Active jobs with elapsed time; with filters, any matching jobs
pub async fn handle_jobs(
    config: &GatewayConfig,
    pool: &SqlitePool,
    status: Option<&str>,
    model: Option<&str>,
    batch: Option<String>,
    label: Option<String>,
    json: bool,
) -> Result<()> {
    let filtered = status.is_some() || model.is_some() || batch.is_some() || label.is_some();

    let jobs = if filtered {
        let status = status.map(parse_status).transpose()?;
        let model = model
            .map(|alias| config.resolve(alias).map(str::to_string))
            .transpose()?;
        let filter = JobFilter {
            status,
            model,
            batch_id: batch,
            label,
        };
        report::filtered_jobs(pool, &filter).await?
    } else {
        report::active_jobs(pool).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("{}", "No matching jobs.".yellow());
        return Ok(());
    }

    let now = Utc::now();
    println!("{}", format!("{} job(s):", jobs.len()).bold());
    for job in jobs {
        let elapsed = job
            .elapsed(now)
            .map(|d| format_elapsed(d.num_seconds()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {:<6} {:<8} {:<24} {:<10} {}",
            "▸".cyan(),
            job.id.to_string().bold(),
            colorize_status(job.status),
            job.model.dimmed(),
            elapsed,
            job.label
        );
    }

    Ok(())
}

/// Aggregate statistics per model
pub async fn handle_stats(
    config: &GatewayConfig,
    pool: &SqlitePool,
    last: Option<&str>,
    json: bool,
) -> Result<()> {
    let stats = report::stats(pool, config, last).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", format!("Statistics ({}):", stats.period).bold());
    for row in stats.models {
        let avg = row
            .avg_duration_ms
            .map(|ms| format_elapsed(ms / 1000))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<8} total: {:<5} ok: {:<5} failed: {:<5} rate: {:<5} avg: {}",
            row.alias.cyan(),
            row.total,
            row.succeeded.to_string().green(),
            row.failed.to_string().red(),
            format!("{:.2}", row.success_rate),
            avg.dimmed()
        );
    }

    Ok(())
}

/// Recent failures with diagnostics
pub async fn handle_errors(
    pool: &SqlitePool,
    last: Option<&str>,
    limit: i64,
    json: bool,
) -> Result<()> {
    let failures = report::recent_failures(pool, last, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&failures)?);
        return Ok(());
    }

    if failures.is_empty() {
        println!("{}", "No recent failures.".green());
        return Ok(());
    }

    println!("{}", format!("{} failure(s):", failures.len()).bold());
    for job in failures {
        let finished = job
            .finished_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "  {} job {} [{}] {} exit={}",
            "✗".red(),
            job.id.to_string().bold(),
            job.label,
            finished.dimmed(),
            job.exit_code.unwrap_or(-1)
        );
        if let Some(stderr) = &job.stderr_tail {
            for line in stderr.lines().rev().take(3).collect::<Vec<_>>().iter().rev() {
                println!("      {}", line.red());
            }
        }
    }

    Ok(())
}

/// Current pacing state per model
pub async fn handle_pacing(
    config: &GatewayConfig,
    pool: &SqlitePool,
    json: bool,
) -> Result<()> {
    let overview = report::pacing_overview(pool, config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    println!("{}", "Pacing:".bold());
    for info in overview {
        let backoff = if info.backoff_ms > 0 {
            format!("+{}ms backoff", info.backoff_ms).yellow()
        } else {
            "".normal()
        };
        println!(
            "  {:<8} gap: {:<7} streak: {:<3} {}",
            info.alias.cyan(),
            format!("{}ms", info.min_gap_ms),
            info.success_streak,
            backoff
        );
    }

    Ok(())
}

fn format_elapsed(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    if total_seconds < 60 {
        format!("{}s", total_seconds)
    } else if total_seconds < 3600 {
        format!("{}m{:02}s", total_seconds / 60, total_seconds % 60)
    } else {
        format!("{}h{:02}m", total_seconds / 3600, (total_seconds % 3600) / 60)
    }
}

fn colorize_status(status: JobStatus) -> colored::ColoredString {
    let s = status.as_str();
    match status {
        JobStatus::Waiting => s.yellow(),
        JobStatus::Running => s.cyan(),
        JobStatus::Done => s.green(),
        JobStatus::Failed => s.red(),
    }
}

fn colorize_health(health: ModelHealth) -> colored::ColoredString {
    let s = health.as_str();
    match health {
        ModelHealth::Ok => s.green(),
        ModelHealth::Busy => s.cyan(),
        ModelHealth::Cooling => s.yellow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(5), "5s");
        assert_eq!(format_elapsed(65), "1m05s");
        assert_eq!(format_elapsed(3725), "1h02m");
        assert_eq!(format_elapsed(-3), "0s");
    }

    #[test]
    fn status_filter_parsing() {
        assert_eq!(parse_status("waiting").unwrap(), JobStatus::Waiting);
        assert_eq!(parse_status("failed").unwrap(), JobStatus::Failed);
        assert!(parse_status("exploded").is_err());
    }
}
