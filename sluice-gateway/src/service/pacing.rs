//! Pacing Controller
//!
//! Keeps per-model request spacing near the fastest rate the backend
//! sustains without rate-limiting. Successes shrink the gap multiplicatively
//! (faster once a streak builds), rate limits grow it multiplicatively and
//! add a flat backoff that drains on later successes. The gap is clamped to
//! a per-model floor and a global ceiling on every update.

use chrono::{DateTime, Utc};
use sluice_core::config::GatewayConfig;
use sluice_core::domain::pacing::PacingState;
use sqlx::SqlitePool;

use crate::repository::pacing_repository;
use crate::service::Result;

/// Adaptive spacing decisions for all configured models. Holds no state of
/// its own; the pacing table is the single source of truth.
pub struct PacingController<'a> {
    pool: &'a SqlitePool,
    config: &'a GatewayConfig,
}

impl<'a> PacingController<'a> {
    pub fn new(pool: &'a SqlitePool, config: &'a GatewayConfig) -> Self {
        Self { pool, config }
    }

    /// Whether a dispatch to `model` is allowed at `now`.
    pub async fn eligible(&self, model: &str, now: DateTime<Utc>) -> Result<bool> {
        let state = self.state(model).await?;
        Ok(state.is_eligible(now))
    }

    /// Records that a dispatch to `model` happened at `now`.
    pub async fn on_dispatch(&self, model: &str, now: DateTime<Utc>) -> Result<()> {
        pacing_repository::record_dispatch(self.pool, model, now).await?;
        Ok(())
    }

    /// Success feedback for `model`.
    pub async fn on_success(&self, model: &str) -> Result<()> {
        pacing_repository::apply_success(
            self.pool,
            model,
            self.config.floor_for_model(model),
            self.config.streak_threshold,
            self.config.streak_speedup,
            self.config.speedup_factor,
            self.config.backoff_drain_ms,
        )
        .await?;
        Ok(())
    }

    /// Rate-limit feedback for `model`.
    pub async fn on_rate_limit(&self, model: &str) -> Result<()> {
        tracing::warn!(model, "rate limit reported, growing pacing gap");
        pacing_repository::apply_rate_limit(
            self.pool,
            model,
            self.config.ceiling_ms,
            self.config.backoff_growth,
            self.config.backoff_penalty_ms,
        )
        .await?;
        Ok(())
    }

    /// Current state for one model, creating the row lazily for models that
    /// joined the configuration after the store was created.
    pub async fn state(&self, model: &str) -> Result<PacingState> {
        if let Some(state) = pacing_repository::find_by_model(self.pool, model).await? {
            return Ok(state);
        }
        pacing_repository::seed(self.pool, model, self.config.initial_gap_ms).await?;
        pacing_repository::find_by_model(self.pool, model)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound.into())
    }
}
