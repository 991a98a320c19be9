//! Job Repository
//!
//! All database operations on job rows. Every state transition is a single
//! guarded UPDATE: the WHERE clause names the required source status and the
//! caller learns from `rows_affected` whether it won the transition. A racer
//! that finds the row already moved on gets `false`, never an error.

use chrono::{DateTime, Utc};
use sluice_core::domain::job::{Job, JobStatus};
use sluice_core::dto::job::{CancelTarget, SubmitJob};
use sluice_core::hash::prompt_hash;
use sqlx::SqlitePool;

const JOB_COLUMNS: &str = "id, model, status, label, prompt_hash, prompt_text, pid, cwd, \
     created_at, started_at, finished_at, exit_code, retry_count, batch_id, \
     stdout_tail, stderr_tail";

fn select_jobs(tail: &str) -> String {
    format!("SELECT {} FROM jobs {}", JOB_COLUMNS, tail)
}

fn ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Insert a new waiting job; returns its id.
pub async fn create(
    pool: &SqlitePool,
    req: &SubmitJob,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let hash = prompt_hash(&req.prompt_text);

    let result = sqlx::query(
        r#"
        INSERT INTO jobs (model, status, label, prompt_hash, prompt_text, cwd,
                          created_at, retry_count, batch_id)
        VALUES (?, 'waiting', ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(&req.model)
    .bind(&req.label)
    .bind(&hash)
    .bind(&req.prompt_text)
    .bind(&req.cwd)
    .bind(ms(now))
    .bind(&req.batch_id)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Find a job by ID
pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(&select_jobs("WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Into::into))
}

/// A waiting or running job carrying the same prompt fingerprint and model,
/// if one exists. Used to fold duplicate submissions into the live job.
pub async fn find_active_duplicate(
    pool: &SqlitePool,
    model: &str,
    hash: &str,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(&select_jobs(
        "WHERE model = ? AND prompt_hash = ? AND status IN ('waiting', 'running') \
         ORDER BY id LIMIT 1",
    ))
    .bind(model)
    .bind(hash)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// waiting -> running. Records the owning pid and start time.
pub async fn transition_to_running(
    pool: &SqlitePool,
    id: i64,
    pid: i64,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'running', pid = ?, started_at = ?
        WHERE id = ? AND status = 'waiting'
        "#,
    )
    .bind(pid)
    .bind(ms(at))
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// running -> done/failed depending on the exit code.
pub async fn complete(
    pool: &SqlitePool,
    id: i64,
    exit_code: i64,
    stdout_tail: Option<&str>,
    stderr_tail: Option<&str>,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = CASE WHEN ? = 0 THEN 'done' ELSE 'failed' END,
            exit_code = ?,
            finished_at = ?,
            stdout_tail = ?,
            stderr_tail = ?
        WHERE id = ? AND status = 'running'
        "#,
    )
    .bind(exit_code)
    .bind(exit_code)
    .bind(ms(at))
    .bind(stdout_tail)
    .bind(stderr_tail)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// waiting/running -> failed, immediately. `started_at` is back-filled when
/// the job never ran so terminal rows always carry a start time.
pub async fn force_fail(
    pool: &SqlitePool,
    id: i64,
    reason: &str,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'failed',
            exit_code = COALESCE(exit_code, -1),
            started_at = COALESCE(started_at, ?),
            finished_at = ?,
            stderr_tail = COALESCE(stderr_tail, ?)
        WHERE id = ? AND status IN ('waiting', 'running')
        "#,
    )
    .bind(ms(at))
    .bind(ms(at))
    .bind(reason)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// running -> waiting after a detected rate limit. Bumps the retry counter
/// and clears the ownership fields so a later sweep can re-dispatch it.
pub async fn requeue(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'waiting', pid = NULL, started_at = NULL,
            retry_count = retry_count + 1
        WHERE id = ? AND status = 'running'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Waiting jobs in creation order, for the promotion sweep.
pub async fn list_waiting(pool: &SqlitePool) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(&select_jobs(
        "WHERE status = 'waiting' ORDER BY created_at ASC, id ASC",
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Waiting and running jobs in creation order.
pub async fn list_active(pool: &SqlitePool) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(&select_jobs(
        "WHERE status IN ('waiting', 'running') ORDER BY created_at ASC, id ASC",
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// All running jobs, for the stale-process sweep.
pub async fn list_running(pool: &SqlitePool) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(&select_jobs("WHERE status = 'running'"))
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Optional filters for the general job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub model: Option<String>,
    pub batch_id: Option<String>,
    pub label: Option<String>,
}

/// Jobs matching every provided filter, creation order. An empty filter
/// lists everything.
pub async fn list_filtered(
    pool: &SqlitePool,
    filter: &JobFilter,
) -> Result<Vec<Job>, sqlx::Error> {
    let status = filter.status.map(|s| s.as_str());

    let rows = sqlx::query_as::<_, JobRow>(&select_jobs(
        "WHERE (? IS NULL OR status = ?) \
           AND (? IS NULL OR model = ?) \
           AND (? IS NULL OR batch_id = ?) \
           AND (? IS NULL OR label = ?) \
         ORDER BY created_at ASC, id ASC",
    ))
    .bind(status)
    .bind(status)
    .bind(&filter.model)
    .bind(&filter.model)
    .bind(&filter.batch_id)
    .bind(&filter.batch_id)
    .bind(&filter.label)
    .bind(&filter.label)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Non-terminal jobs matching a cancellation target.
pub async fn list_non_terminal(
    pool: &SqlitePool,
    target: &CancelTarget,
) -> Result<Vec<Job>, sqlx::Error> {
    let rows = match target {
        CancelTarget::Job(id) => {
            sqlx::query_as::<_, JobRow>(&select_jobs(
                "WHERE id = ? AND status IN ('waiting', 'running')",
            ))
            .bind(*id)
            .fetch_all(pool)
            .await?
        }
        CancelTarget::Batch(batch) => {
            sqlx::query_as::<_, JobRow>(&select_jobs(
                "WHERE batch_id = ? AND status IN ('waiting', 'running')",
            ))
            .bind(batch)
            .fetch_all(pool)
            .await?
        }
        CancelTarget::Model(model) => {
            sqlx::query_as::<_, JobRow>(&select_jobs(
                "WHERE model = ? AND status IN ('waiting', 'running')",
            ))
            .bind(model)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Running-job counts grouped by model.
pub async fn running_counts(pool: &SqlitePool) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (String, i64)>(
        "SELECT model, COUNT(*) FROM jobs WHERE status = 'running' GROUP BY model",
    )
    .fetch_all(pool)
    .await
}

/// Aggregate row for one model over a stats window.
#[derive(Debug, sqlx::FromRow)]
pub struct ModelAggregate {
    pub model: String,
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub avg_duration_ms: Option<i64>,
}

/// Terminal-job aggregates per model, optionally bounded to jobs finished
/// after `cutoff`.
pub async fn model_aggregates(
    pool: &SqlitePool,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<ModelAggregate>, sqlx::Error> {
    let cutoff_ms = cutoff.map(ms);

    sqlx::query_as::<_, ModelAggregate>(
        r#"
        SELECT model,
               COUNT(*) AS total,
               SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END) AS succeeded,
               SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) AS failed,
               CAST(AVG(CASE WHEN started_at IS NOT NULL AND finished_at IS NOT NULL
                             THEN finished_at - started_at END) AS INTEGER) AS avg_duration_ms
        FROM jobs
        WHERE status IN ('done', 'failed')
          AND (? IS NULL OR finished_at >= ?)
        GROUP BY model
        "#,
    )
    .bind(cutoff_ms)
    .bind(cutoff_ms)
    .fetch_all(pool)
    .await
}

/// Failed jobs with their diagnostics, newest first.
pub async fn list_failures(
    pool: &SqlitePool,
    cutoff: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<Job>, sqlx::Error> {
    let cutoff_ms = cutoff.map(ms);

    let rows = sqlx::query_as::<_, JobRow>(&select_jobs(
        "WHERE status = 'failed' AND (? IS NULL OR finished_at >= ?) \
         ORDER BY finished_at DESC LIMIT ?",
    ))
    .bind(cutoff_ms)
    .bind(cutoff_ms)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Delete terminal jobs that finished before `cutoff`; returns the count.
pub async fn reap_older_than(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM jobs
        WHERE status IN ('done', 'failed')
          AND finished_at IS NOT NULL
          AND finished_at < ?
        "#,
    )
    .bind(ms(cutoff))
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    model: String,
    status: String,
    label: String,
    prompt_hash: String,
    prompt_text: String,
    pid: Option<i64>,
    cwd: String,
    created_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    exit_code: Option<i64>,
    retry_count: i64,
    batch_id: Option<String>,
    stdout_tail: Option<String>,
    stderr_tail: Option<String>,
}

fn from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            model: row.model,
            status: JobStatus::parse(&row.status),
            label: row.label,
            prompt_hash: row.prompt_hash,
            prompt_text: row.prompt_text,
            pid: row.pid,
            cwd: row.cwd,
            created_at: from_ms(row.created_at),
            started_at: row.started_at.map(from_ms),
            finished_at: row.finished_at.map(from_ms),
            exit_code: row.exit_code,
            retry_count: row.retry_count,
            batch_id: row.batch_id,
            stdout_tail: row.stdout_tail,
            stderr_tail: row.stderr_tail,
        }
    }
}

// =============================================================================
// Test fixtures
// =============================================================================


#[cfg(test)]
mod tests {
    use super::fixtures::{SeedJob, insert};
    use super::*;
    use crate::db;
    use chrono::Duration;
    use sluice_core::config::GatewayConfig;

    fn submit_req(model: &str, prompt: &str) -> SubmitJob {
        SubmitJob {
            model: model.to_string(),
            prompt_text: prompt.to_string(),
            label: "test".to_string(),
            cwd: "/tmp".to_string(),
            batch_id: None,
        }
    }

    #[tokio::test]
    async fn create_inserts_waiting_job() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;

        let id = create(&pool, &submit_req("gemini-2.5-flash", "hello"), Utc::now())
            .await
            .unwrap();

        let job = find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.model, "gemini-2.5-flash");
        assert_eq!(job.prompt_hash.len(), 12);
        assert!(job.started_at.is_none());
        assert_eq!(job.retry_count, 0);
    }

    #[tokio::test]
    async fn transition_to_running_wins_exactly_once() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;
        let id = create(&pool, &submit_req("gemini-2.5-flash", "x"), Utc::now())
            .await
            .unwrap();

        let now = Utc::now();
        assert!(transition_to_running(&pool, id, 4242, now).await.unwrap());
        // Second claimant observes the job already left `waiting`
        assert!(!transition_to_running(&pool, id, 4343, now).await.unwrap());

        let job = find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.pid, Some(4242));
        assert!(job.started_at.is_some());
    }

    #[tokio::test]
    async fn complete_maps_exit_code_to_status() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;

        for (exit_code, expected) in [(0, JobStatus::Done), (1, JobStatus::Failed)] {
            let id = create(&pool, &submit_req("gemini-2.5-flash", "x"), Utc::now())
                .await
                .unwrap();
            transition_to_running(&pool, id, 100, Utc::now())
                .await
                .unwrap();

            assert!(
                complete(&pool, id, exit_code, Some("out"), Some("err"), Utc::now())
                    .await
                    .unwrap()
            );

            let job = find_by_id(&pool, id).await.unwrap().unwrap();
            assert_eq!(job.status, expected);
            assert_eq!(job.exit_code, Some(exit_code));
            assert!(job.finished_at.is_some());
            assert_eq!(job.stdout_tail.as_deref(), Some("out"));
        }
    }

    #[tokio::test]
    async fn complete_requires_running() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;
        let id = create(&pool, &submit_req("gemini-2.5-flash", "x"), Utc::now())
            .await
            .unwrap();

        assert!(!complete(&pool, id, 0, None, None, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn force_fail_backfills_started_at() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;
        let id = create(&pool, &submit_req("gemini-2.5-flash", "x"), Utc::now())
            .await
            .unwrap();

        assert!(force_fail(&pool, id, "cancelled", Utc::now()).await.unwrap());

        let job = find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_some());
        assert_eq!(job.exit_code, Some(-1));
        assert_eq!(job.stderr_tail.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn requeue_resets_ownership_and_counts_retry() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;
        let id = create(&pool, &submit_req("gemini-2.5-flash", "x"), Utc::now())
            .await
            .unwrap();
        transition_to_running(&pool, id, 100, Utc::now())
            .await
            .unwrap();

        assert!(requeue(&pool, id).await.unwrap());

        let job = find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.retry_count, 1);
        assert!(job.pid.is_none());
        assert!(job.started_at.is_none());
    }

    #[tokio::test]
    async fn duplicate_lookup_sees_only_active_jobs() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;
        let req = submit_req("gemini-2.5-flash", "same prompt");
        let id = create(&pool, &req, Utc::now()).await.unwrap();
        let hash = prompt_hash("same prompt");

        let dup = find_active_duplicate(&pool, "gemini-2.5-flash", &hash)
            .await
            .unwrap();
        assert_eq!(dup.map(|j| j.id), Some(id));

        // Terminal jobs never block resubmission
        force_fail(&pool, id, "cancelled", Utc::now()).await.unwrap();
        assert!(
            find_active_duplicate(&pool, "gemini-2.5-flash", &hash)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn reap_deletes_old_terminal_jobs_only() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;
        let now = Utc::now();

        let old = insert(
            &pool,
            SeedJob {
                status: JobStatus::Done,
                finished_at: Some(now - Duration::days(8)),
                ..SeedJob::default()
            },
        )
        .await;
        let recent = insert(
            &pool,
            SeedJob {
                status: JobStatus::Done,
                finished_at: Some(now),
                ..SeedJob::default()
            },
        )
        .await;
        let live = insert(
            &pool,
            SeedJob {
                status: JobStatus::Running,
                pid: Some(1),
                started_at: Some(now - Duration::days(9)),
                ..SeedJob::default()
            },
        )
        .await;

        let reaped = reap_older_than(&pool, now - Duration::days(7)).await.unwrap();
        assert_eq!(reaped, 1);
        assert!(find_by_id(&pool, old).await.unwrap().is_none());
        assert!(find_by_id(&pool, recent).await.unwrap().is_some());
        assert!(find_by_id(&pool, live).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn filtered_listing_composes_filters() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;

        insert(
            &pool,
            SeedJob {
                label: "alpha".to_string(),
                batch_id: Some("batch-a".to_string()),
                ..SeedJob::default()
            },
        )
        .await;
        insert(
            &pool,
            SeedJob {
                label: "alpha".to_string(),
                model: "gemini-2.5-pro".to_string(),
                ..SeedJob::default()
            },
        )
        .await;
        insert(
            &pool,
            SeedJob {
                label: "beta".to_string(),
                status: JobStatus::Done,
                finished_at: Some(Utc::now()),
                ..SeedJob::default()
            },
        )
        .await;

        let all = list_filtered(&pool, &JobFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let by_label = list_filtered(
            &pool,
            &JobFilter {
                label: Some("alpha".to_string()),
                ..JobFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_label.len(), 2);

        let narrowed = list_filtered(
            &pool,
            &JobFilter {
                label: Some("alpha".to_string()),
                model: Some("gemini-2.5-pro".to_string()),
                ..JobFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(narrowed.len(), 1);

        let done = list_filtered(
            &pool,
            &JobFilter {
                status: Some(JobStatus::Done),
                ..JobFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].label, "beta");
    }

    #[tokio::test]
    async fn non_terminal_listing_scopes_by_target() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;

        let in_batch = insert(
            &pool,
            SeedJob {
                status: JobStatus::Running,
                pid: Some(1),
                batch_id: Some("batch-a".to_string()),
                ..SeedJob::default()
            },
        )
        .await;
        insert(
            &pool,
            SeedJob {
                batch_id: Some("batch-a".to_string()),
                ..SeedJob::default()
            },
        )
        .await;
        let other_batch = insert(
            &pool,
            SeedJob {
                batch_id: Some("batch-b".to_string()),
                ..SeedJob::default()
            },
        )
        .await;

        let matched = list_non_terminal(&pool, &CancelTarget::Batch("batch-a".to_string()))
            .await
            .unwrap();
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().any(|j| j.id == in_batch));
        assert!(matched.iter().all(|j| j.id != other_batch));

        let by_model = list_non_terminal(
            &pool,
            &CancelTarget::Model("gemini-2.5-flash".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(by_model.len(), 3);
    }
}
