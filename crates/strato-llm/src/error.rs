//! LLM client errors.

use thiserror::Error;

/// Errors from backend chat clients.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Request failed before a response arrived.
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {body}")]
    HttpStatus {
        /// Status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// The response could not be parsed.
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    /// The stream broke mid-generation.
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LlmError {
    /// Whether a non-streaming retry is worth attempting.
    ///
    /// Stream breakage and transport hiccups are transient; a 4xx status is
    /// not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Streaming(_) | Self::RequestFailed(_) | Self::Http(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Streaming("reset".into()).is_transient());
        assert!(LlmError::HttpStatus { status: 503, body: String::new() }.is_transient());
        assert!(!LlmError::HttpStatus { status: 400, body: String::new() }.is_transient());
        assert!(!LlmError::InvalidResponse("bad json".into()).is_transient());
    }
}
