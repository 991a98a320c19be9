//! Reporting Service
//!
//! Read-only projections over the store for the status/jobs/stats/errors/
//! pacing commands. Nothing here mutates state.

use chrono::Utc;
use sluice_core::config::GatewayConfig;
use sluice_core::domain::job::Job;
use sluice_core::dto::report::{ModelHealth, ModelStats, ModelStatus, PacingInfo, StatsReport};
use sluice_core::window::parse_window;
use sqlx::SqlitePool;

use crate::repository::{job_repository, pacing_repository};
use crate::service::Result;

/// Live per-model status: running count plus a health classification.
pub async fn model_status(
    pool: &SqlitePool,
    config: &GatewayConfig,
) -> Result<Vec<ModelStatus>> {
    let running: std::collections::HashMap<String, i64> =
        job_repository::running_counts(pool).await?.into_iter().collect();
    let backoff: std::collections::HashMap<String, i64> = pacing_repository::list(pool)
        .await?
        .into_iter()
        .map(|p| (p.model.clone(), p.backoff_ms))
        .collect();

    let mut statuses = Vec::new();
    for alias in config.aliases() {
        let model = config.resolve(alias)?;
        let count = running.get(model).copied().unwrap_or(0);
        let health = if count > 0 {
            ModelHealth::Busy
        } else if backoff.get(model).copied().unwrap_or(0) > 0 {
            ModelHealth::Cooling
        } else {
            ModelHealth::Ok
        };
        statuses.push(ModelStatus {
            alias: alias.to_string(),
            model: model.to_string(),
            running: count,
            health,
        });
    }

    Ok(statuses)
}

/// Currently active jobs (waiting and running), oldest first.
pub async fn active_jobs(pool: &SqlitePool) -> Result<Vec<Job>> {
    Ok(job_repository::list_active(pool).await?)
}

/// Jobs matching the given filters across all statuses, oldest first.
pub async fn filtered_jobs(
    pool: &SqlitePool,
    filter: &job_repository::JobFilter,
) -> Result<Vec<Job>> {
    Ok(job_repository::list_filtered(pool, filter).await?)
}

/// Aggregate statistics per alias over an optional window (`1h`, `2d`,
/// `30m`); `None` means lifetime. Every configured alias gets a row even
/// with no recorded jobs.
pub async fn stats(
    pool: &SqlitePool,
    config: &GatewayConfig,
    window: Option<&str>,
) -> Result<StatsReport> {
    let duration = parse_window(window)?;
    let cutoff = duration.map(|d| Utc::now() - d);

    let aggregates = job_repository::model_aggregates(pool, cutoff).await?;
    let by_model: std::collections::HashMap<&str, &job_repository::ModelAggregate> =
        aggregates.iter().map(|a| (a.model.as_str(), a)).collect();

    let mut models = Vec::new();
    for alias in config.aliases() {
        let concrete = config.resolve(alias)?;
        let row = by_model.get(concrete);
        let (total, succeeded, failed, avg) = match row {
            Some(a) => (a.total, a.succeeded, a.failed, a.avg_duration_ms),
            None => (0, 0, 0, None),
        };
        let success_rate = if total > 0 {
            (succeeded as f64 / total as f64 * 100.0).round() / 100.0
        } else {
            0.0
        };
        models.push(ModelStats {
            alias: alias.to_string(),
            total,
            succeeded,
            failed,
            success_rate,
            avg_duration_ms: avg,
        });
    }

    Ok(StatsReport {
        period: window.unwrap_or("lifetime").to_string(),
        models,
    })
}

/// Recent failures with their captured diagnostics, newest first.
pub async fn recent_failures(
    pool: &SqlitePool,
    window: Option<&str>,
    limit: i64,
) -> Result<Vec<Job>> {
    let duration = parse_window(window)?;
    let cutoff = duration.map(|d| Utc::now() - d);
    Ok(job_repository::list_failures(pool, cutoff, limit).await?)
}

/// Current pacing state per model, labelled with the configured alias.
pub async fn pacing_overview(
    pool: &SqlitePool,
    config: &GatewayConfig,
) -> Result<Vec<PacingInfo>> {
    let rows = pacing_repository::list(pool).await?;
    Ok(rows
        .into_iter()
        .map(|state| {
            let alias = config
                .alias_for(&state.model)
                .unwrap_or(state.model.as_str())
                .to_string();
            PacingInfo {
                alias,
                model: state.model,
                min_gap_ms: state.min_gap_ms,
                backoff_ms: state.backoff_ms,
                success_streak: state.success_streak,
                last_dispatch_at: state.last_dispatch_at,
            }
        })
        .collect())
}
