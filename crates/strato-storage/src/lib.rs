#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Persistent stores for the Strato orchestrator.
//!
//! Everything sits on one embedded `SurrealDB` connection: in-memory for
//! tests (`connect_memory`), `SurrealKV`-backed for deployments
//! (`connect_embedded`). Three typed stores wrap it:
//!
//! - [`ConversationStore`]: messages keyed by `(thread_id, timestamp)` with
//!   range queries per thread.
//! - [`UserStore`]: accounts keyed by `user_id`, with a secondary lookup by
//!   `(provider, provider_user_id)` for auth methods.
//! - [`MetricsStore`]: TTL'd metric points keyed by
//!   `(metric_type, timestamp)`.

mod conversation;
mod db;
mod error;
mod metrics;
mod users;

pub use conversation::{ConversationStore, StoredMessage, StoredRole};
pub use db::Database;
pub use error::{StorageError, StorageResult};
pub use metrics::{MetricPoint, MetricsStore};
pub use users::UserStore;
