//! Single-service health probes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// A registered dependency to probe.
#[derive(Debug, Clone)]
pub struct ServiceProbe {
    /// Service name.
    pub name: String,
    /// Health URL.
    pub url: String,
    /// Per-probe timeout.
    pub timeout: Duration,
    /// Whether the service is critical to overall health.
    pub critical: bool,
    /// Status code counted as healthy (some services answer 400 on their
    /// root path by design).
    pub expected_status: u16,
}

impl ServiceProbe {
    /// Create a probe expecting HTTP 200 within 5 s.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout: Duration::from_secs(5),
            critical: true,
            expected_status: 200,
        }
    }

    /// Mark as non-critical.
    #[must_use]
    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    /// Expect a different status code.
    #[must_use]
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Set the probe timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute the probe.
    pub async fn probe(&self, client: &reqwest::Client) -> ProbeResult {
        let started = Instant::now();
        match client.get(&self.url).timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                ProbeResult {
                    service: self.name.clone(),
                    timestamp: Utc::now(),
                    healthy: status == self.expected_status,
                    status_code: Some(status),
                    response_time_ms: started.elapsed().as_millis() as u64,
                    error: None,
                }
            },
            Err(e) => ProbeResult {
                service: self.name.clone(),
                timestamp: Utc::now(),
                healthy: false,
                status_code: None,
                response_time_ms: started.elapsed().as_millis() as u64,
                error: Some(if e.is_timeout() {
                    "timeout".to_string()
                } else {
                    e.to_string()
                }),
            },
        }
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    /// Service name.
    pub service: String,
    /// When the probe ran.
    pub timestamp: DateTime<Utc>,
    /// Whether the service answered as expected.
    pub healthy: bool,
    /// HTTP status, when a response arrived.
    pub status_code: Option<u16>,
    /// Round-trip time.
    pub response_time_ms: u64,
    /// Error detail for failed probes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_builder() {
        let probe = ServiceProbe::new("db", "http://db:8000")
            .non_critical()
            .expect_status(400)
            .with_timeout(Duration::from_secs(2));
        assert!(!probe.critical);
        assert_eq!(probe.expected_status, 400);
        assert_eq!(probe.timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_unreachable_service_unhealthy() {
        let probe = ServiceProbe::new("gone", "http://127.0.0.1:1/health")
            .with_timeout(Duration::from_millis(200));
        let result = probe.probe(&reqwest::Client::new()).await;
        assert!(!result.healthy);
        assert!(result.status_code.is_none());
        assert!(result.error.is_some());
    }
}
