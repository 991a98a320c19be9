//! Dispatch Supervisor
//!
//! Owns the job lifecycle: submission (with duplicate folding), the
//! promotion sweep that hands eligible waiting jobs to detached workers,
//! completion reconciliation with rate-limit classification, maintenance
//! (stale processes, retention), and cancellation. There is no daemon; every
//! gateway command runs maintenance and a sweep opportunistically.

use chrono::{Duration, Utc};
use sluice_core::config::GatewayConfig;
use sluice_core::domain::job::{Job, JobStatus};
use sluice_core::dto::job::{CancelTarget, SubmitJob};
use sluice_core::dto::report::MaintenanceReport;
use sluice_core::hash::prompt_hash;
use sluice_core::outcome::{Outcome, classify};
use sqlx::SqlitePool;

use crate::repository::job_repository;
use crate::runner::{self, RunnerOutput};
use crate::service::Result;
use crate::service::pacing::PacingController;

/// Captured output kept on the job row, in characters.
const TAIL_LIMIT: usize = 4000;

/// Result of one submission.
#[derive(Debug, Clone, Copy)]
pub struct Submission {
    pub job_id: i64,
    /// True when an active job with the same prompt and model was reused.
    pub deduplicated: bool,
}

pub struct Supervisor<'a> {
    pool: &'a SqlitePool,
    config: &'a GatewayConfig,
}

impl<'a> Supervisor<'a> {
    pub fn new(pool: &'a SqlitePool, config: &'a GatewayConfig) -> Self {
        Self { pool, config }
    }

    fn pacing(&self) -> PacingController<'a> {
        PacingController::new(self.pool, self.config)
    }

    /// Stores a new waiting job. Unless `force`, a submission whose prompt
    /// and model match an active job folds into that job instead.
    pub async fn submit(&self, req: &SubmitJob, force: bool) -> Result<Submission> {
        if !force {
            let hash = prompt_hash(&req.prompt_text);
            if let Some(existing) =
                job_repository::find_active_duplicate(self.pool, &req.model, &hash).await?
            {
                tracing::info!(
                    job_id = existing.id,
                    model = %req.model,
                    "duplicate prompt folded into active job"
                );
                return Ok(Submission {
                    job_id: existing.id,
                    deduplicated: true,
                });
            }
        }

        let job_id = job_repository::create(self.pool, req, Utc::now()).await?;
        tracing::info!(job_id, model = %req.model, "job submitted");
        Ok(Submission {
            job_id,
            deduplicated: false,
        })
    }

    /// Promotion sweep: walk waiting jobs in creation order and hand each
    /// pacing-eligible one to a detached worker. A model's first dispatch
    /// closes its window, so the rest of its queue stays waiting until a
    /// later sweep. Returns the number of workers spawned.
    pub async fn sweep(&self) -> Result<usize> {
        let pacing = self.pacing();
        let mut dispatched = 0;

        for job in job_repository::list_waiting(self.pool).await? {
            let now = Utc::now();
            if !pacing.eligible(&job.model, now).await? {
                continue;
            }

            match runner::spawn_worker(self.config, job.id) {
                Ok(pid) => {
                    pacing.on_dispatch(&job.model, now).await?;
                    dispatched += 1;
                    tracing::debug!(job_id = job.id, pid, model = %job.model, "job dispatched");
                }
                Err(e) => {
                    // Leave the job waiting; a later sweep retries the spawn
                    tracing::error!(job_id = job.id, "failed to spawn worker: {:#}", e);
                }
            }
        }

        Ok(dispatched)
    }

    /// Worker entry point: claim the job, run the backend, report back, and
    /// sweep again so a freed pacing slot is refilled promptly.
    pub async fn run_job(&self, job_id: i64) -> Result<()> {
        let Some(job) = job_repository::find_by_id(self.pool, job_id).await? else {
            tracing::warn!(job_id, "worker started for a job that no longer exists");
            return Ok(());
        };

        let pid = std::process::id() as i64;
        if !job_repository::transition_to_running(self.pool, job_id, pid, Utc::now()).await? {
            // Another worker won the claim, or the job was cancelled
            tracing::debug!(job_id, "claim lost, exiting");
            return Ok(());
        }

        match runner::invoke(self.config, &job).await {
            Ok(output) => {
                self.report_completion(&job, &output).await?;
            }
            Err(e) => {
                tracing::error!(job_id, "runner invocation failed: {:#}", e);
                job_repository::force_fail(
                    self.pool,
                    job_id,
                    &format!("runner error: {e:#}"),
                    Utc::now(),
                )
                .await?;
            }
        }

        self.sweep().await?;
        Ok(())
    }

    /// Classifies a finished attempt and writes the outcome: success and
    /// ordinary failure are terminal; a rate limit requeues the job until
    /// the retry ceiling, then fails it. Pacing hears about every success
    /// and every rate limit either way.
    pub async fn report_completion(
        &self,
        job: &Job,
        output: &RunnerOutput,
    ) -> Result<Outcome> {
        let outcome = classify(self.config, output.exit_code, &output.stdout, &output.stderr);
        let now = Utc::now();
        let stdout_tail = runner::tail(&output.stdout, TAIL_LIMIT);
        let stderr_tail = runner::tail(&output.stderr, TAIL_LIMIT);

        match outcome {
            Outcome::Success => {
                job_repository::complete(
                    self.pool,
                    job.id,
                    output.exit_code,
                    stdout_tail.as_deref(),
                    stderr_tail.as_deref(),
                    now,
                )
                .await?;
                self.pacing().on_success(&job.model).await?;
                tracing::info!(job_id = job.id, model = %job.model, "job succeeded");
            }
            Outcome::RateLimited => {
                self.pacing().on_rate_limit(&job.model).await?;
                if job.retry_count < self.config.max_retries {
                    job_repository::requeue(self.pool, job.id).await?;
                    tracing::info!(
                        job_id = job.id,
                        retry = job.retry_count + 1,
                        "rate limited, requeued"
                    );
                } else {
                    job_repository::force_fail(
                        self.pool,
                        job.id,
                        &format!(
                            "rate limited, retry ceiling reached ({})",
                            self.config.max_retries
                        ),
                        now,
                    )
                    .await?;
                    tracing::warn!(job_id = job.id, "rate limit retries exhausted");
                }
            }
            Outcome::Failed => {
                job_repository::complete(
                    self.pool,
                    job.id,
                    output.exit_code,
                    stdout_tail.as_deref(),
                    stderr_tail.as_deref(),
                    now,
                )
                .await?;
                tracing::info!(
                    job_id = job.id,
                    exit_code = output.exit_code,
                    "job failed"
                );
            }
        }

        Ok(outcome)
    }

    /// Maintenance pass: fail running jobs whose process is gone and delete
    /// terminal jobs past the retention window. Idempotent; safe to run at
    /// the start of any command.
    pub async fn maintain(&self) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();

        for job in job_repository::list_running(self.pool).await? {
            let alive = job.pid.map(runner::pid_alive).unwrap_or(false);
            if !alive
                && job_repository::force_fail(self.pool, job.id, "process not found", Utc::now())
                    .await?
            {
                report.stale_failed += 1;
                tracing::warn!(job_id = job.id, pid = job.pid, "stale running job failed");
            }
        }

        let cutoff = Utc::now() - Duration::days(self.config.retention_days);
        report.reaped = job_repository::reap_older_than(self.pool, cutoff).await?;
        if report.reaped > 0 {
            tracing::debug!(reaped = report.reaped, "retention sweep deleted old jobs");
        }

        Ok(report)
    }

    /// Cancels every non-terminal job matching the target; returns the
    /// affected count. Termination of running workers is advisory — the row
    /// is failed whether or not the signal lands.
    pub async fn cancel(&self, target: &CancelTarget) -> Result<u64> {
        let mut count = 0;

        for job in job_repository::list_non_terminal(self.pool, target).await? {
            if job_repository::force_fail(self.pool, job.id, "cancelled", Utc::now()).await? {
                count += 1;
                if job.status == JobStatus::Running {
                    if let Some(pid) = job.pid {
                        runner::terminate(pid);
                    }
                }
                tracing::info!(job_id = job.id, "job cancelled");
            }
        }

        Ok(count)
    }
}
