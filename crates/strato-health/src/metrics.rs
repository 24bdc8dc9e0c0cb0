//! The metrics persistence loop.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::checker::HealthChecker;
use strato_storage::{MetricPoint, MetricsStore};

/// Provides the system-side snapshot (VRAM, queue, CPU) for persistence.
///
/// Implemented by the composition root, which can see the orchestrator and
/// queue without this crate depending on them.
#[async_trait]
pub trait SystemSnapshotSource: Send + Sync {
    /// One JSON snapshot of system state.
    async fn system_snapshot(&self) -> Value;
}

/// Periodically persists system and health snapshots with a retention TTL.
pub struct MetricsWriter {
    store: MetricsStore,
    system: Arc<dyn SystemSnapshotSource>,
    health: Arc<HealthChecker>,
    interval: Duration,
    retention_days: i64,
}

impl MetricsWriter {
    /// Create a writer.
    #[must_use]
    pub fn new(
        store: MetricsStore,
        system: Arc<dyn SystemSnapshotSource>,
        health: Arc<HealthChecker>,
        interval: Duration,
        retention_days: i64,
    ) -> Self {
        Self {
            store,
            system,
            health,
            interval,
            retention_days,
        }
    }

    /// Take and persist one snapshot pair.
    pub async fn write_once(&self) {
        let system = self.system.system_snapshot().await;
        if let Err(e) = self
            .store
            .write(MetricPoint::new("system", system, self.retention_days))
            .await
        {
            warn!(error = %e, "could not persist system metrics");
        }

        let health = self.health.snapshot().await;
        match serde_json::to_value(&health) {
            Ok(payload) => {
                if let Err(e) = self
                    .store
                    .write(MetricPoint::new("health", payload, self.retention_days))
                    .await
                {
                    warn!(error = %e, "could not persist health metrics");
                }
            },
            Err(e) => warn!(error = %e, "unserializable health snapshot"),
        }
    }

    /// Spawn the write loop; expired points are purged once per round.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                retention_days = self.retention_days,
                "metrics writer started"
            );
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.write_once().await;
                if let Err(e) = self.store.purge_expired().await {
                    warn!(error = %e, "metric purge failed");
                }
            }
        })
    }
}
