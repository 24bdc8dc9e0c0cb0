//! Storage errors.

use strato_core::StratoError;
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Could not open or reach the database.
    #[error("connection error: {0}")]
    Connection(String),

    /// A query failed.
    #[error("query error: {0}")]
    Query(String),

    /// A stored record did not deserialize.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Query(err.to_string())
    }
}

impl From<StorageError> for StratoError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
