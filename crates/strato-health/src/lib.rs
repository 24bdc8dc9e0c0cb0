#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Health and metrics control loops.
//!
//! Three periodic loops keep the platform observable and bounded:
//! - [`HealthChecker`] probes registered dependencies, tracks consecutive
//!   failures, and emits alerts (with a cooldown) and recovery notices.
//! - [`MetricsWriter`] persists system and health snapshots with a retention
//!   TTL.
//! - [`LogCleanup`] and [`FileJanitor`] delete dated log directories and
//!   stale temp files past their retention.

mod checker;
mod cleanup;
mod metrics;
mod probe;

pub use checker::{HealthChecker, HealthCheckerConfig, ServiceHealth};
pub use cleanup::{FileJanitor, LogCleanup};
pub use metrics::{MetricsWriter, SystemSnapshotSource};
pub use probe::{ProbeResult, ServiceProbe};
