//! TTL'd metric point storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::db::Database;
use crate::error::StorageResult;

/// One metric sample, keyed by `(metric_type, timestamp_ms)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Metric family ("system", "health", ...).
    pub metric_type: String,
    /// Sample timestamp in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Sample payload.
    pub payload: Value,
    /// Expiry in epoch milliseconds; purged after this.
    pub expires_at_ms: i64,
}

impl MetricPoint {
    /// Create a point stamped now, expiring after `retention_days`.
    #[must_use]
    pub fn new(metric_type: &str, payload: Value, retention_days: i64) -> Self {
        let now = chrono::Utc::now();
        let expires = now + chrono::Duration::days(retention_days);
        Self {
            metric_type: metric_type.to_string(),
            timestamp_ms: now.timestamp_millis(),
            payload,
            expires_at_ms: expires.timestamp_millis(),
        }
    }
}

/// Store for metric points.
#[derive(Debug, Clone)]
pub struct MetricsStore {
    db: Database,
}

impl MetricsStore {
    /// Create a store over `db`.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a point.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn write(&self, point: MetricPoint) -> StorageResult<()> {
        self.db
            .client()
            .query("CREATE metric CONTENT $data")
            .bind(("data", point))
            .await?
            .check()?;
        Ok(())
    }

    /// Points of a type inside `[from_ms, to_ms]`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn query(
        &self,
        metric_type: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StorageResult<Vec<MetricPoint>> {
        let mut response = self
            .db
            .client()
            .query(
                "SELECT * FROM metric WHERE metric_type = $kind \
                 AND timestamp_ms >= $from AND timestamp_ms <= $to \
                 ORDER BY timestamp_ms ASC",
            )
            .bind(("kind", metric_type.to_string()))
            .bind(("from", from_ms))
            .bind(("to", to_ms))
            .await?;
        let rows: Vec<MetricPoint> = response.take(0)?;
        Ok(rows)
    }

    /// Remove expired points. Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn purge_expired(&self) -> StorageResult<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut response = self
            .db
            .client()
            .query("SELECT VALUE timestamp_ms FROM metric WHERE expires_at_ms < $now")
            .bind(("now", now))
            .await?;
        let expired: Vec<i64> = response.take(0)?;

        self.db
            .client()
            .query("DELETE metric WHERE expires_at_ms < $now")
            .bind(("now", now))
            .await?
            .check()?;

        if !expired.is_empty() {
            debug!(count = expired.len(), "purged expired metric points");
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> MetricsStore {
        MetricsStore::new(Database::connect_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_write_and_query_range() {
        let store = store().await;
        for ts in [1000, 2000, 3000] {
            store
                .write(MetricPoint {
                    metric_type: "system".to_string(),
                    timestamp_ms: ts,
                    payload: json!({"queue_size": ts / 1000}),
                    expires_at_ms: i64::MAX,
                })
                .await
                .unwrap();
        }

        let points = store.query("system", 1500, 3000).await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp_ms, 2000);
    }

    #[tokio::test]
    async fn test_types_are_isolated() {
        let store = store().await;
        store
            .write(MetricPoint::new("system", json!({}), 2))
            .await
            .unwrap();
        store
            .write(MetricPoint::new("health", json!({}), 2))
            .await
            .unwrap();

        let health = store.query("health", 0, i64::MAX).await.unwrap();
        assert_eq!(health.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = store().await;
        store
            .write(MetricPoint {
                metric_type: "system".to_string(),
                timestamp_ms: 1,
                payload: json!({}),
                expires_at_ms: 1, // long expired
            })
            .await
            .unwrap();
        store
            .write(MetricPoint::new("system", json!({}), 2))
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        let remaining = store.query("system", 0, i64::MAX).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
