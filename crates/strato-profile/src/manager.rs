//! Circuit-breaker profile fallback and recovery.
//!
//! When a CRITICAL model keeps crashing, the orchestrator calls
//! [`ProfileManager::on_circuit_breaker`]; the manager drops the platform to
//! the conservative profile and remembers where it came from. Recovery is
//! active: a poller (and a pre-dispatch check) probes the failed backend's
//! health endpoint and switches back on the first success.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::capability::ModelPriority;
use crate::registry::ProfileRegistry;

/// Profile the circuit breaker falls back to.
const FALLBACK_PROFILE: &str = "conservative";

/// Probes whether the previously failing backend has recovered.
#[async_trait]
pub trait RecoveryProbe: Send + Sync {
    /// Returns `true` when the backend answers healthy.
    async fn is_healthy(&self) -> bool;
}

/// HTTP probe against `{endpoint}/health`.
pub struct HttpRecoveryProbe {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpRecoveryProbe {
    /// Create a probe for `endpoint` with a 2 s timeout.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

#[async_trait]
impl RecoveryProbe for HttpRecoveryProbe {
    async fn is_healthy(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                debug!(%url, status = response.status().as_u16(), healthy, "recovery probe");
                healthy
            },
            Err(e) => {
                debug!(%url, error = %e, "recovery probe failed");
                false
            },
        }
    }
}

/// Snapshot of the fallback state for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackStatus {
    /// Whether a fallback switch is in effect.
    pub fallback_active: bool,
    /// Profile to return to once the backend recovers.
    pub original_profile: Option<String>,
}

#[derive(Debug, Default)]
struct FallbackState {
    active: bool,
    original_profile: Option<String>,
}

/// Coordinates circuit-breaker fallback and recovery.
pub struct ProfileManager {
    registry: Arc<ProfileRegistry>,
    probe: Arc<dyn RecoveryProbe>,
    // Non-reentrant switch guard; also owns the fallback state so a
    // concurrent trigger and recovery cannot interleave half-switched.
    state: Mutex<FallbackState>,
}

impl ProfileManager {
    /// Create a manager over `registry` using `probe` for recovery checks.
    #[must_use]
    pub fn new(registry: Arc<ProfileRegistry>, probe: Arc<dyn RecoveryProbe>) -> Self {
        Self {
            registry,
            probe,
            state: Mutex::new(FallbackState::default()),
        }
    }

    /// Circuit breaker hook, called by the VRAM orchestrator after a crash
    /// pushes a model over the threshold.
    ///
    /// Switches to the conservative profile only when the crashed model is
    /// CRITICAL in the active profile and no fallback is already in effect.
    pub async fn on_circuit_breaker(&self, model_id: &str, crash_count: usize) {
        let mut state = self.state.lock().await;

        let active = self.registry.active();
        if state.active || active.name == FALLBACK_PROFILE {
            debug!(%model_id, "ignoring circuit breaker: already in fallback");
            return;
        }

        let is_critical = active
            .capability(model_id)
            .is_some_and(|cap| cap.priority == ModelPriority::Critical);
        if !is_critical {
            debug!(%model_id, "ignoring circuit breaker for non-critical model");
            return;
        }

        error!(
            %model_id,
            crash_count,
            from = %active.name,
            "critical model crash loop, switching to conservative profile"
        );

        match self.registry.switch(FALLBACK_PROFILE) {
            Ok(()) => {
                state.active = true;
                state.original_profile = Some(active.name.clone());
            },
            Err(e) => {
                // Leave state untouched so a later trigger can retry.
                error!(error = %e, "fallback profile switch failed");
            },
        }
    }

    /// Probe the failed backend and recover to the original profile if it is
    /// healthy again. Safe to call at any time; a no-op outside fallback.
    pub async fn check_and_recover(&self) {
        // Probe without holding the lock; re-check state afterwards.
        {
            let state = self.state.lock().await;
            if !state.active {
                return;
            }
        }

        if !self.probe.is_healthy().await {
            debug!("backend still unhealthy, staying in fallback");
            return;
        }

        let mut state = self.state.lock().await;
        if !state.active {
            return;
        }
        let Some(original) = state.original_profile.clone() else {
            warn!("fallback active without an original profile; clearing");
            state.active = false;
            return;
        };

        match self.registry.switch(&original) {
            Ok(()) => {
                info!(profile = %original, "backend recovered, restored original profile");
                state.active = false;
                state.original_profile = None;
            },
            Err(e) => {
                // Stay in fallback; the next probe round retries.
                error!(error = %e, "profile recovery failed");
            },
        }
    }

    /// Current fallback status.
    pub async fn status(&self) -> FallbackStatus {
        let state = self.state.lock().await;
        FallbackStatus {
            fallback_active: state.active,
            original_profile: state.original_profile.clone(),
        }
    }

    /// Spawn the recovery poller, probing every `interval`.
    #[must_use]
    pub fn spawn_recovery_poller(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.check_and_recover().await;
            }
        })
    }
}
