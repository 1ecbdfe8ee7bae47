//! Workflow errors.

use thiserror::Error;

use crate::backend::BackendError;
use crate::orchestrator::Phase;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The product is not part of the current catalog.
    #[error("Unknown product: {0}")]
    InvalidSelection(String),

    #[error("No Product Available")]
    NoProductAvailable,

    /// The commit produced no result. Carries the backend's last error.
    #[error("Commit failed: {last_error}")]
    CommitFailed { last_error: String },

    #[error("An installation is already in progress")]
    InstallationInProgress,

    #[error("Cannot {operation} while {phase}")]
    InvalidState { operation: &'static str, phase: Phase },

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A blocking backend task panicked or was cancelled.
    #[error("Backend worker failed: {0}")]
    Worker(String),
}
