//! VRAM orchestration errors.

use strato_core::StratoError;
use thiserror::Error;

/// Errors from the VRAM orchestrator.
#[derive(Debug, Error)]
pub enum VramError {
    /// Admission cannot succeed even after full eviction.
    #[error("over budget: need {required_gb:.1}GB, can free at most {available_gb:.1}GB")]
    OverBudget {
        /// Space the incoming model needs.
        required_gb: f64,
        /// Space eviction could free.
        available_gb: f64,
    },

    /// A backend rejected or failed an operation.
    #[error("backend error ({backend}): {message}")]
    Backend {
        /// Backend name.
        backend: String,
        /// Failure detail.
        message: String,
    },

    /// No manager is registered for this backend type.
    #[error("no backend manager for '{0}'")]
    UnsupportedBackend(String),

    /// The crash circuit breaker is open for this model.
    #[error("circuit open for model '{0}'")]
    CircuitOpen(String),
}

impl From<VramError> for StratoError {
    fn from(err: VramError) -> Self {
        match err {
            VramError::OverBudget {
                required_gb,
                available_gb,
            } => Self::OverBudget {
                required_gb,
                available_gb,
            },
            VramError::Backend { backend, message } => {
                Self::BackendUnavailable(format!("{backend}: {message}"))
            },
            VramError::UnsupportedBackend(name) => {
                Self::BackendUnavailable(format!("unsupported backend: {name}"))
            },
            VramError::CircuitOpen(model) => Self::CircuitOpen(model),
        }
    }
}

/// Result type for VRAM operations.
pub type VramResult<T> = Result<T, VramError>;
