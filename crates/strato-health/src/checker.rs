//! The health check loop with consecutive-failure alerting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::probe::{ProbeResult, ServiceProbe};

/// Ring buffer depth per service.
const HISTORY_LIMIT: usize = 100;

/// Checker tuning.
#[derive(Debug, Clone)]
pub struct HealthCheckerConfig {
    /// Interval between probe rounds.
    pub interval: Duration,
    /// Consecutive failures before an alert fires.
    pub alert_threshold: u32,
    /// Minimum gap between repeated alerts for one service.
    pub alert_cooldown: Duration,
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            alert_threshold: 3,
            alert_cooldown: Duration::from_secs(300),
        }
    }
}

/// Per-service snapshot for monitoring surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Latest probe outcome.
    pub healthy: bool,
    /// Healthy share of the retained window, in percent.
    pub uptime_pct: f64,
    /// Current consecutive-failure streak.
    pub consecutive_failures: u32,
    /// Latest response time.
    pub response_time_ms: u64,
}

struct ServiceState {
    history: VecDeque<ProbeResult>,
    consecutive_failures: u32,
    last_alert_at: Option<DateTime<Utc>>,
}

impl ServiceState {
    fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            consecutive_failures: 0,
            last_alert_at: None,
        }
    }

    fn push(&mut self, result: ProbeResult) {
        if self.history.len() >= HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(result);
    }

    fn uptime_pct(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let healthy = self.history.iter().filter(|r| r.healthy).count();
        (healthy as f64 / self.history.len() as f64) * 100.0
    }
}

/// Probes registered services on a fixed interval, alerting after a streak
/// of failures and announcing recovery on the first healthy sample.
pub struct HealthChecker {
    probes: Vec<ServiceProbe>,
    client: reqwest::Client,
    config: HealthCheckerConfig,
    state: Mutex<HashMap<String, ServiceState>>,
}

impl HealthChecker {
    /// Create a checker over a fixed probe set.
    #[must_use]
    pub fn new(probes: Vec<ServiceProbe>, config: HealthCheckerConfig) -> Self {
        Self {
            probes,
            client: reqwest::Client::new(),
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Run one probe round across all services concurrently.
    pub async fn check_all(&self) {
        let results = futures::future::join_all(
            self.probes
                .iter()
                .map(|probe| probe.probe(&self.client)),
        )
        .await;

        let mut state = self.state.lock().await;
        for result in results {
            let service = result.service.clone();
            let entry = state.entry(service.clone()).or_insert_with(ServiceState::new);

            if result.healthy {
                if entry.consecutive_failures > 0 {
                    info!(service = %service, "service recovered");
                }
                entry.consecutive_failures = 0;
            } else {
                entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
                warn!(
                    service = %service,
                    failures = entry.consecutive_failures,
                    threshold = self.config.alert_threshold,
                    "service unhealthy"
                );

                if entry.consecutive_failures >= self.config.alert_threshold {
                    let cooldown_over = entry.last_alert_at.is_none_or(|last| {
                        (Utc::now() - last).num_seconds()
                            >= self.config.alert_cooldown.as_secs() as i64
                    });
                    if cooldown_over {
                        let critical = self
                            .probes
                            .iter()
                            .find(|p| p.name == service)
                            .is_some_and(|p| p.critical);
                        error!(
                            service = %service,
                            failures = entry.consecutive_failures,
                            severity = if critical { "critical" } else { "warning" },
                            "ALERT: consecutive health check failures"
                        );
                        entry.last_alert_at = Some(Utc::now());
                    }
                }
            }

            entry.push(result);
        }
    }

    /// Snapshot of all services for the monitoring stream.
    pub async fn snapshot(&self) -> HashMap<String, ServiceHealth> {
        let state = self.state.lock().await;
        self.probes
            .iter()
            .map(|probe| {
                let health = state.get(&probe.name).map_or(
                    ServiceHealth {
                        healthy: false,
                        uptime_pct: 0.0,
                        consecutive_failures: 0,
                        response_time_ms: 0,
                    },
                    |entry| ServiceHealth {
                        healthy: entry.history.back().is_some_and(|r| r.healthy),
                        uptime_pct: entry.uptime_pct(),
                        consecutive_failures: entry.consecutive_failures,
                        response_time_ms: entry
                            .history
                            .back()
                            .map_or(0, |r| r.response_time_ms),
                    },
                );
                (probe.name.clone(), health)
            })
            .collect()
    }

    /// Whether every critical service's latest sample is healthy.
    pub async fn all_critical_healthy(&self) -> bool {
        let snapshot = self.snapshot().await;
        self.probes
            .iter()
            .filter(|p| p.critical)
            .all(|p| snapshot.get(&p.name).is_some_and(|h| h.healthy))
    }

    /// Spawn the periodic check loop.
    #[must_use]
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let checker = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                services = checker.probes.len(),
                interval_secs = checker.config.interval.as_secs(),
                "health check loop started"
            );
            let mut ticker = tokio::time::interval(checker.config.interval);
            loop {
                ticker.tick().await;
                checker.check_all().await;
            }
        })
    }

    /// Test hook: feed a synthetic probe result through the streak logic.
    #[cfg(test)]
    pub(crate) async fn ingest(&self, result: ProbeResult) {
        let mut state = self.state.lock().await;
        let entry = state
            .entry(result.service.clone())
            .or_insert_with(ServiceState::new);
        if result.healthy {
            entry.consecutive_failures = 0;
        } else {
            entry.consecutive_failures += 1;
        }
        entry.push(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(service: &str, healthy: bool) -> ProbeResult {
        ProbeResult {
            service: service.to_string(),
            timestamp: Utc::now(),
            healthy,
            status_code: healthy.then_some(200),
            response_time_ms: 5,
            error: (!healthy).then(|| "down".to_string()),
        }
    }

    fn checker() -> HealthChecker {
        HealthChecker::new(
            vec![ServiceProbe::new("api", "http://api/health")],
            HealthCheckerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_uptime_over_window() {
        let checker = checker();
        for i in 0..10 {
            checker.ingest(result("api", i % 2 == 0)).await;
        }
        let snapshot = checker.snapshot().await;
        let api = &snapshot["api"];
        assert!((api.uptime_pct - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_consecutive_failures_reset_on_recovery() {
        let checker = checker();
        checker.ingest(result("api", false)).await;
        checker.ingest(result("api", false)).await;
        assert_eq!(checker.snapshot().await["api"].consecutive_failures, 2);

        checker.ingest(result("api", true)).await;
        let snapshot = checker.snapshot().await;
        assert_eq!(snapshot["api"].consecutive_failures, 0);
        assert!(snapshot["api"].healthy);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let checker = checker();
        for _ in 0..250 {
            checker.ingest(result("api", true)).await;
        }
        let state = checker.state.lock().await;
        assert_eq!(state["api"].history.len(), HISTORY_LIMIT);
    }

    #[tokio::test]
    async fn test_all_critical_healthy() {
        let checker = HealthChecker::new(
            vec![
                ServiceProbe::new("api", "http://api/health"),
                ServiceProbe::new("bot", "http://bot/health").non_critical(),
            ],
            HealthCheckerConfig::default(),
        );
        checker.ingest(result("api", true)).await;
        checker.ingest(result("bot", false)).await;
        // Non-critical failure doesn't degrade overall health.
        assert!(checker.all_critical_healthy().await);

        checker.ingest(result("api", false)).await;
        assert!(!checker.all_critical_healthy().await);
    }

    #[tokio::test]
    async fn test_unknown_service_defaults() {
        let checker = checker();
        let snapshot = checker.snapshot().await;
        assert!(!snapshot["api"].healthy);
        assert!((snapshot["api"].uptime_pct).abs() < f64::EPSILON);
    }
}
