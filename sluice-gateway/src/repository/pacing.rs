//! Pacing Repository
//!
//! Database operations on per-model pacing rows. The two feedback updates do
//! their arithmetic inside a single UPDATE so concurrent reporters cannot
//! interleave a read-modify-write; floor and ceiling clamps are applied in
//! the same statement.

use chrono::{DateTime, Utc};
use sluice_core::domain::pacing::PacingState;
use sqlx::SqlitePool;

/// Create the row for a model if it does not exist yet.
pub async fn seed(
    pool: &SqlitePool,
    model: &str,
    initial_gap_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO pacing (model, min_gap_ms) VALUES (?, ?)")
        .bind(model)
        .bind(initial_gap_ms)
        .execute(pool)
        .await?;
    Ok(())
}

/// Fetch one model's pacing state.
pub async fn find_by_model(
    pool: &SqlitePool,
    model: &str,
) -> Result<Option<PacingState>, sqlx::Error> {
    let row = sqlx::query_as::<_, PacingRow>(
        "SELECT model, min_gap_ms, backoff_ms, success_streak, last_dispatch_at \
         FROM pacing WHERE model = ?",
    )
    .bind(model)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// All pacing rows, in model order.
pub async fn list(pool: &SqlitePool) -> Result<Vec<PacingState>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PacingRow>(
        "SELECT model, min_gap_ms, backoff_ms, success_streak, last_dispatch_at \
         FROM pacing ORDER BY model",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Stamp the last dispatch time.
pub async fn record_dispatch(
    pool: &SqlitePool,
    model: &str,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE pacing SET last_dispatch_at = ? WHERE model = ?")
        .bind(at.timestamp_millis())
        .bind(model)
        .execute(pool)
        .await?;
    Ok(())
}

/// Success feedback: extend the streak, shrink the gap (streak multiplier
/// once the threshold is reached), drain a fixed slice of backoff.
///
/// All right-hand sides see the pre-update row, so the multiplier choice
/// uses the streak value being incremented in the same statement.
pub async fn apply_success(
    pool: &SqlitePool,
    model: &str,
    floor_ms: i64,
    streak_threshold: i64,
    streak_speedup: f64,
    speedup_factor: f64,
    backoff_drain_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE pacing
        SET success_streak = success_streak + 1,
            min_gap_ms = MAX(?, CAST(ROUND(min_gap_ms *
                CASE WHEN success_streak + 1 >= ? THEN ? ELSE ? END) AS INTEGER)),
            backoff_ms = MAX(0, backoff_ms - ?)
        WHERE model = ?
        "#,
    )
    .bind(floor_ms)
    .bind(streak_threshold)
    .bind(streak_speedup)
    .bind(speedup_factor)
    .bind(backoff_drain_ms)
    .bind(model)
    .execute(pool)
    .await?;
    Ok(())
}

/// Rate-limit feedback: reset the streak, grow the gap up to the ceiling,
/// add the flat backoff penalty.
pub async fn apply_rate_limit(
    pool: &SqlitePool,
    model: &str,
    ceiling_ms: i64,
    backoff_growth: f64,
    backoff_penalty_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE pacing
        SET success_streak = 0,
            min_gap_ms = MIN(?, CAST(ROUND(min_gap_ms * ?) AS INTEGER)),
            backoff_ms = backoff_ms + ?
        WHERE model = ?
        "#,
    )
    .bind(ceiling_ms)
    .bind(backoff_growth)
    .bind(backoff_penalty_ms)
    .bind(model)
    .execute(pool)
    .await?;
    Ok(())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PacingRow {
    model: String,
    min_gap_ms: i64,
    backoff_ms: i64,
    success_streak: i64,
    last_dispatch_at: Option<i64>,
}

impl From<PacingRow> for PacingState {
    fn from(row: PacingRow) -> Self {
        PacingState {
            model: row.model,
            min_gap_ms: row.min_gap_ms,
            backoff_ms: row.backoff_ms,
            success_streak: row.success_streak,
            last_dispatch_at: row
                .last_dispatch_at
                .and_then(DateTime::from_timestamp_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use sluice_core::config::GatewayConfig;

    #[tokio::test]
    async fn seed_is_idempotent() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;

        // Re-seeding must not reset an adjusted gap
        apply_rate_limit(&pool, "gemini-2.5-flash", 60_000, 1.8, 5000)
            .await
            .unwrap();
        seed(&pool, "gemini-2.5-flash", config.initial_gap_ms)
            .await
            .unwrap();

        let state = find_by_model(&pool, "gemini-2.5-flash")
            .await
            .unwrap()
            .unwrap();
        assert!(state.min_gap_ms > config.initial_gap_ms);
    }

    #[tokio::test]
    async fn record_dispatch_stamps_time() {
        let config = GatewayConfig::default();
        let pool = db::test_pool(&config).await;
        let now = Utc::now();

        record_dispatch(&pool, "gemini-2.5-flash", now).await.unwrap();

        let state = find_by_model(&pool, "gemini-2.5-flash")
            .await
            .unwrap()
            .unwrap();
        let stamped = state.last_dispatch_at.unwrap();
        assert_eq!(stamped.timestamp_millis(), now.timestamp_millis());
    }
}
