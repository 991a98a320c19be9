//! Service Module
//!
//! Business logic layer: pacing control, batch assignment, dispatch
//! supervision, and read-only reporting over the store.

pub mod assign;
pub mod pacing;
pub mod report;
pub mod supervisor;

use sluice_core::config::ConfigError;
use sluice_core::window::WindowError;
use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors surfaced by the service layer
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage I/O failed; fatal to the invoking command
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration rejected the request (e.g. unknown model alias)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed stats window (e.g. "3w")
    #[error(transparent)]
    Window(#[from] WindowError),
}
