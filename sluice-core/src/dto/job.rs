//! Job DTOs

use serde::{Deserialize, Serialize};

/// Request to enqueue a new job. `model` is already concrete — alias
/// resolution (and batch assignment) happens before the store is touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJob {
    pub model: String,
    pub prompt_text: String,
    pub label: String,
    pub cwd: String,
    pub batch_id: Option<String>,
}

/// What a cancellation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelTarget {
    /// One job by id.
    Job(i64),
    /// Every non-terminal job sharing a batch id.
    Batch(String),
    /// Every non-terminal job of a concrete model.
    Model(String),
}
