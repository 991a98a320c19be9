//! Report DTOs consumed by the read-only status commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health classification for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelHealth {
    /// Idle and accepting dispatches.
    Ok,
    /// At least one job currently running.
    Busy,
    /// Idle but still draining rate-limit backoff.
    Cooling,
}

impl ModelHealth {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Busy => "busy",
            Self::Cooling => "cooling",
        }
    }
}

/// Live status of one configured model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub alias: String,
    pub model: String,
    pub running: i64,
    pub health: ModelHealth,
}

/// Aggregate statistics for one model over a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStats {
    pub alias: String,
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
    /// succeeded / total, rounded to two decimals; 0.0 when total is zero.
    pub success_rate: f64,
    pub avg_duration_ms: Option<i64>,
}

/// Full stats report: one row per configured alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    /// "lifetime" or the window spec the caller passed (e.g. "24h").
    pub period: String,
    pub models: Vec<ModelStats>,
}

/// Pacing state for one model, labelled with its alias for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingInfo {
    pub alias: String,
    pub model: String,
    pub min_gap_ms: i64,
    pub backoff_ms: i64,
    pub success_streak: i64,
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Running jobs whose process was gone, now failed.
    pub stale_failed: u64,
    /// Terminal jobs deleted by the retention sweep.
    pub reaped: u64,
}
