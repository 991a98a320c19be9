//! Store bootstrap
//!
//! Opens the sqlite pool and applies migrations. The schema is evolved
//! additively: base tables via CREATE TABLE IF NOT EXISTS, later columns via
//! ALTER TABLE with duplicate-column errors ignored, so an old database file
//! keeps working (absent columns read back as null).

use std::time::Duration;

use sluice_core::config::GatewayConfig;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::repository::pacing_repository;

/// Opens the store at the configured path, creating and migrating as needed.
pub async fn open(config: &GatewayConfig) -> Result<SqlitePool, sqlx::Error> {
    if let Some(dir) = config.db_path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir).map_err(sqlx::Error::Io)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&config.db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        // Writers queue behind the busy handler instead of failing outright
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    seed_pacing(&pool, config).await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            model TEXT NOT NULL,
            status TEXT NOT NULL,
            label TEXT NOT NULL DEFAULT '',
            prompt_hash TEXT NOT NULL,
            prompt_text TEXT NOT NULL,
            pid INTEGER,
            cwd TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            started_at INTEGER,
            finished_at INTEGER,
            exit_code INTEGER,
            retry_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pacing (
            model TEXT PRIMARY KEY,
            min_gap_ms INTEGER NOT NULL,
            backoff_ms INTEGER NOT NULL DEFAULT 0,
            success_streak INTEGER NOT NULL DEFAULT 0,
            last_dispatch_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Columns added after the initial schema shipped. Each ALTER fails with
    // "duplicate column name" on an up-to-date database; that error is the
    // only one ignored here.
    let additive = [
        "ALTER TABLE jobs ADD COLUMN batch_id TEXT",
        "ALTER TABLE jobs ADD COLUMN stdout_tail TEXT",
        "ALTER TABLE jobs ADD COLUMN stderr_tail TEXT",
    ];
    for sql in additive {
        match sqlx::query(sql).execute(pool).await {
            Ok(_) => {}
            Err(e) if e.to_string().contains("duplicate column name") => {}
            Err(e) => return Err(e),
        }
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_model ON jobs(model, status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_batch ON jobs(batch_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_finished ON jobs(finished_at)")
        .execute(pool)
        .await?;

    tracing::debug!("store migrations applied");
    Ok(())
}

/// Ensures a pacing row exists for every configured model.
pub async fn seed_pacing(pool: &SqlitePool, config: &GatewayConfig) -> Result<(), sqlx::Error> {
    for model in config.concrete_models() {
        pacing_repository::seed(pool, model, config.initial_gap_ms).await?;
    }
    Ok(())
}

/// In-memory store for tests, migrated and seeded like the real one.
#[cfg(test)]
pub async fn test_pool(config: &GatewayConfig) -> SqlitePool {
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
    // One connection: each sqlite memory database is private to its connection
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    seed_pacing(&pool, config).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::config::GatewayConfig;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let config = GatewayConfig::default();
        let pool = test_pool(&config).await;
        // Second pass must not trip over existing tables or columns
        run_migrations(&pool).await.unwrap();
        seed_pacing(&pool, &config).await.unwrap();
    }

    #[tokio::test]
    async fn pacing_rows_seeded_for_all_models() {
        let config = GatewayConfig::default();
        let pool = test_pool(&config).await;
        let rows = pacing_repository::list(&pool).await.unwrap();
        assert_eq!(rows.len(), config.models.len());
        for row in rows {
            assert_eq!(row.min_gap_ms, config.initial_gap_ms);
            assert_eq!(row.backoff_ms, 0);
            assert!(row.last_dispatch_at.is_none());
        }
    }
}
