//! Embedded `SurrealDB` connection wrapper.

use crate::error::{StorageError, StorageResult};

/// Shared database handle.
///
/// | Mode | Connection | Backend |
/// |------|------------|---------|
/// | Embedded | `surrealkv://path` | `SurrealKV` |
/// | Tests | `mem://` | In-memory |
#[derive(Clone)]
pub struct Database {
    inner: surrealdb::Surreal<surrealdb::engine::any::Any>,
}

impl Database {
    /// Open an embedded database persisted under `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] when the engine cannot open the
    /// path.
    pub async fn connect_embedded(path: &str) -> StorageResult<Self> {
        Self::connect(&format!("surrealkv://{path}"), "main").await
    }

    /// Open an in-memory database (tests, ephemeral deployments).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] when initialization fails.
    pub async fn connect_memory() -> StorageResult<Self> {
        Self::connect("mem://", "test").await
    }

    async fn connect(endpoint: &str, db_name: &str) -> StorageResult<Self> {
        let db: surrealdb::Surreal<surrealdb::engine::any::Any> = surrealdb::Surreal::init();
        db.connect(endpoint)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        db.use_ns("strato")
            .use_db(db_name)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self { inner: db })
    }

    /// The underlying client, for store implementations.
    #[must_use]
    pub(crate) fn client(&self) -> &surrealdb::Surreal<surrealdb::engine::any::Any> {
        &self.inner
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
