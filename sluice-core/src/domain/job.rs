//! Job domain types
//!
//! One job is one request to run a prompt against a model. Rows are owned by
//! the store; services and commands only ever see this struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single gateway request, durable from submission to cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    /// Concrete model name (already resolved from its alias).
    pub model: String,
    pub status: JobStatus,
    pub label: String,
    /// 12-char hex fingerprint of `prompt_text`.
    pub prompt_hash: String,
    pub prompt_text: String,
    /// Owning OS process once running; kept after the job leaves `running`.
    pub pid: Option<i64>,
    /// Working directory of the submitter, inherited by the runner.
    pub cwd: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i64>,
    /// Times this job was re-queued after a detected rate limit.
    pub retry_count: i64,
    /// Shared by jobs submitted together in one batch.
    pub batch_id: Option<String>,
    pub stdout_tail: Option<String>,
    pub stderr_tail: Option<String>,
}

impl Job {
    /// Wall-clock time spent so far (running) or total (terminal).
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let start = self.started_at?;
        Some(self.finished_at.unwrap_or(now) - start)
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Unknown strings map to `Failed` so a corrupted row can never be
    /// mistaken for live work.
    pub fn parse(s: &str) -> Self {
        match s {
            "waiting" => Self::Waiting,
            "running" => Self::Running,
            "done" => Self::Done,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [
            JobStatus::Waiting,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_status_is_failed() {
        assert_eq!(JobStatus::parse("exploded"), JobStatus::Failed);
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Waiting.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
