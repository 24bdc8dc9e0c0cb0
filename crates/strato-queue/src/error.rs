//! Queue errors.

use strato_core::StratoError;
use thiserror::Error;

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("queue is full ({capacity} requests)")]
    Full {
        /// Configured capacity.
        capacity: usize,
    },
}

impl From<QueueError> for StratoError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Full { .. } => Self::QueueFull,
        }
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
