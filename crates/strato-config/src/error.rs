//! Configuration errors.

use thiserror::Error;

/// Errors raised while reading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("invalid value for {var}: {message}")]
    InvalidValue {
        /// Variable name.
        var: String,
        /// What went wrong.
        message: String,
    },

    /// A cross-field invariant does not hold.
    #[error("validation failed for {field}: {message}")]
    ValidationError {
        /// Field path.
        field: String,
        /// What went wrong.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
