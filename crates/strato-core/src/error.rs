//! Platform-wide error surface.

use thiserror::Error;

/// Errors surfaced across subsystem boundaries.
///
/// Subsystem crates define their own error enums and convert into this
/// surface where a failure becomes visible to callers or clients. The
/// variants mirror the distinct user-visible failure messages.
#[derive(Debug, Error)]
pub enum StratoError {
    /// The request queue is at capacity.
    #[error("Queue is full. Please try again in a few minutes.")]
    QueueFull,

    /// Hard maintenance mode is rejecting new requests.
    #[error("Maintenance in progress: {0}")]
    MaintenanceActive(String),

    /// A profile failed validation or does not exist.
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    /// A model id could not be resolved to any capability.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Admission would exceed the VRAM hard limit even after eviction.
    #[error("Cannot load model: needs {required_gb:.1}GB but only {available_gb:.1}GB can be freed")]
    OverBudget {
        /// Space the model needs.
        required_gb: f64,
        /// Space eviction could actually free.
        available_gb: f64,
    },

    /// An inference backend is unreachable or returned an error.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A model process crashed during generation.
    #[error("Model crashed: {model_id} ({reason})")]
    ModelCrashed {
        /// Model that crashed.
        model_id: String,
        /// Reported crash reason.
        reason: String,
    },

    /// The crash circuit breaker is open for this model.
    #[error("Circuit open for model: {0}")]
    CircuitOpen(String),

    /// An in-flight request exceeded its visibility deadline.
    #[error("Request timed out (visibility timeout expired)")]
    VisibilityTimeout,

    /// The request was cancelled by the user.
    #[error("Cancelled by user")]
    Cancelled,

    /// The user did not answer an `ask_user` question in time.
    #[error("User did not respond within {timeout_secs} seconds")]
    AskUserTimeout {
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// A tool failed; carried back to the agent, never past the loop.
    #[error("Tool error: {0}")]
    ToolError(String),

    /// File content extraction failed.
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    /// The user's weekly token budget is exhausted.
    #[error("Token budget exceeded: {remaining} tokens remaining this week")]
    TokenBudgetExceeded {
        /// Tokens the user still has.
        remaining: u64,
    },

    /// Authentication token was missing or invalid.
    #[error("Invalid token")]
    InvalidToken,

    /// The caller lacks the required role.
    #[error("Forbidden")]
    Forbidden,

    /// Storage layer failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Catch-all for internal failures that have no client-facing shape.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StratoError {
    /// Stable machine-readable kind for wire serialization.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::MaintenanceActive(_) => "maintenance_active",
            Self::InvalidProfile(_) => "invalid_profile",
            Self::UnknownModel(_) => "unknown_model",
            Self::OverBudget { .. } => "over_budget",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::ModelCrashed { .. } => "model_crashed",
            Self::CircuitOpen(_) => "circuit_open",
            Self::VisibilityTimeout => "visibility_timeout",
            Self::Cancelled => "cancelled",
            Self::AskUserTimeout { .. } => "ask_user_timeout",
            Self::ToolError(_) => "tool_error",
            Self::ExtractionFailed(_) => "extraction_failed",
            Self::TokenBudgetExceeded { .. } => "token_budget_exceeded",
            Self::InvalidToken => "invalid_token",
            Self::Forbidden => "forbidden",
            Self::Storage(_) => "storage",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether this failure should be retried by the queue.
    ///
    /// User-facing rejections and cancellations are terminal; transient
    /// backend failures are worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::ModelCrashed { .. } | Self::VisibilityTimeout
        )
    }
}

/// Result alias for operations crossing subsystem boundaries.
pub type StratoResult<T> = Result<T, StratoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_over_budget_message() {
        let err = StratoError::OverBudget {
            required_gb: 20.0,
            available_gb: 10.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("20.0GB"));
        assert!(msg.contains("10.0GB"));
    }

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(StratoError::QueueFull.kind(), "queue_full");
        assert_eq!(StratoError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StratoError::BackendUnavailable("down".into()).is_retryable());
        assert!(StratoError::VisibilityTimeout.is_retryable());
        assert!(!StratoError::QueueFull.is_retryable());
        assert!(!StratoError::Cancelled.is_retryable());
    }
}
