//! Profile errors.

use thiserror::Error;

/// Errors from profile loading and switching.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No profile registered under this name.
    #[error("unknown profile: '{name}' (available: {available})")]
    UnknownProfile {
        /// Requested name.
        name: String,
        /// Comma-separated registered names.
        available: String,
    },

    /// A profile failed consistency validation.
    #[error("invalid profile '{name}': {message}")]
    InvalidProfile {
        /// Profile name.
        name: String,
        /// Violated invariant.
        message: String,
    },
}

/// Result type for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;
