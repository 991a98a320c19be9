//! Pacing domain types
//!
//! One row per concrete model, owned by the store and mutated only through
//! the pacing controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Adaptive spacing state for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingState {
    pub model: String,
    /// Mandatory spacing before the next dispatch to this model.
    pub min_gap_ms: i64,
    /// Additive penalty accumulated from rate-limit events; drains on success.
    pub backoff_ms: i64,
    /// Consecutive successes since the last rate-limit event.
    pub success_streak: i64,
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

impl PacingState {
    /// Full enforced spacing: gap plus whatever backoff remains.
    pub fn effective_gap_ms(&self) -> i64 {
        self.min_gap_ms + self.backoff_ms
    }

    /// Whether a dispatch is allowed at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.last_dispatch_at {
            None => true,
            Some(last) => (now - last).num_milliseconds() >= self.effective_gap_ms(),
        }
    }
}
