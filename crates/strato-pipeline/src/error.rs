//! Pipeline errors.

use strato_core::StratoError;
use thiserror::Error;

/// Errors from pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Model call failed after the non-streaming retry.
    #[error("backend unavailable: {0}")]
    Backend(String),

    /// The turn was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// VRAM admission failed.
    #[error(transparent)]
    Vram(#[from] strato_vram::VramError),

    /// Storage failure while reading or writing conversation state.
    #[error(transparent)]
    Storage(#[from] strato_storage::StorageError),
}

impl From<PipelineError> for StratoError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Backend(message) => Self::BackendUnavailable(message),
            PipelineError::Cancelled => Self::Cancelled,
            PipelineError::Vram(inner) => inner.into(),
            PipelineError::Storage(inner) => inner.into(),
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
