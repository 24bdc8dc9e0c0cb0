//! The VRAM orchestrator facade.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{BackendManager, LoadOutcome};
use crate::crash::{CrashStatus, CrashTracker};
use crate::error::{VramError, VramResult};
use crate::eviction::EvictionStrategy;
use crate::monitor::{MemoryMonitor, PsiMetrics};
use crate::registry::{LoadedModel, ModelRegistry};
use strato_profile::{ModelPriority, ProfileManager, ProfileRegistry};

/// Models at or above this size trigger a buffer-cache flush before loading.
const FLUSH_THRESHOLD_GB: f64 = 20.0;

/// Hook fired when the crash circuit breaker opens for a CRITICAL model.
#[async_trait]
pub trait FallbackHook: Send + Sync {
    /// Notify that `model_id` crossed the crash threshold.
    async fn on_circuit_breaker(&self, model_id: &str, crash_count: usize);
}

#[async_trait]
impl FallbackHook for ProfileManager {
    async fn on_circuit_breaker(&self, model_id: &str, crash_count: usize) {
        ProfileManager::on_circuit_breaker(self, model_id, crash_count).await;
    }
}

/// No-op hook for deployments without profile fallback.
#[derive(Debug, Default)]
pub struct NoFallback;

#[async_trait]
impl FallbackHook for NoFallback {
    async fn on_circuit_breaker(&self, _model_id: &str, _crash_count: usize) {}
}

/// One loaded model in a status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedModelStatus {
    /// Model id.
    pub model_id: String,
    /// Backend name.
    pub backend: String,
    /// Size in GB.
    pub size_gb: f64,
    /// Priority.
    pub priority: String,
    /// Whether it is externally managed.
    pub is_external: bool,
    /// Seconds since last access.
    pub idle_secs: i64,
}

/// Point-in-time orchestrator status.
#[derive(Debug, Clone, Serialize)]
pub struct VramStatus {
    /// Loaded models.
    pub loaded_models: Vec<LoadedModelStatus>,
    /// System total memory.
    pub total_gb: f64,
    /// System used memory.
    pub used_gb: f64,
    /// System available memory.
    pub available_gb: f64,
    /// Sum of managed (non-external) model sizes.
    pub model_usage_gb: f64,
    /// Managed usage as a percentage of the hard limit.
    pub usage_pct: f64,
    /// Profile hard limit.
    pub hard_limit_gb: f64,
    /// PSI averages.
    pub psi: PsiMetrics,
}

/// Mutable orchestrator state, guarded by one mutex so admission decisions,
/// eviction, and crash accounting are serialized.
struct State {
    registry: ModelRegistry,
    crashes: CrashTracker,
}

/// Admits model loads against the profile's VRAM budget, evicting victims
/// when needed, delegating backend I/O, and feeding the crash circuit
/// breaker.
pub struct VramOrchestrator {
    state: Mutex<State>,
    monitor: Arc<dyn MemoryMonitor>,
    strategy: Box<dyn EvictionStrategy>,
    backends: Arc<dyn BackendManager>,
    profiles: Arc<ProfileRegistry>,
    fallback: Arc<dyn FallbackHook>,
}

impl VramOrchestrator {
    /// Wire up an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        monitor: Arc<dyn MemoryMonitor>,
        strategy: Box<dyn EvictionStrategy>,
        backends: Arc<dyn BackendManager>,
        profiles: Arc<ProfileRegistry>,
        fallback: Arc<dyn FallbackHook>,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                registry: ModelRegistry::new(),
                crashes: CrashTracker::new(2, 300),
            }),
            monitor,
            strategy,
            backends,
            profiles,
            fallback,
        }
    }

    /// Configure the crash circuit breaker.
    #[must_use]
    pub fn with_crash_policy(self, threshold: usize, window_secs: u64) -> Self {
        // Constructed before use; no contention yet.
        if let Ok(mut state) = self.state.try_lock() {
            state.crashes = CrashTracker::new(threshold, window_secs);
        }
        self
    }

    /// Make `model_id` resident, evicting victims if the budget requires it.
    ///
    /// Already-loaded models just get their LRU timestamp refreshed.
    ///
    /// # Errors
    ///
    /// - [`VramError::CircuitOpen`] while the model is in a crash loop.
    /// - [`VramError::OverBudget`] when eviction cannot free enough space.
    /// - [`VramError::Backend`] when the responsible backend fails the load.
    pub async fn ensure_loaded(
        &self,
        model_id: &str,
        priority_override: Option<ModelPriority>,
    ) -> VramResult<()> {
        let mut state = self.state.lock().await;

        if state.registry.is_loaded(model_id) {
            state.registry.touch(model_id);
            debug!(%model_id, "already resident, refreshed LRU");
            return Ok(());
        }

        if state.crashes.check(model_id).needs_protection {
            return Err(VramError::CircuitOpen(model_id.to_string()));
        }

        let capability = self.profiles.capabilities(model_id);
        let priority = priority_override.unwrap_or(capability.priority);
        let required = capability.vram_size_gb;
        let hard_limit = self.profiles.active().vram_hard_limit_gb;
        let current = state.registry.manageable_usage_gb();

        if current + required > hard_limit {
            let victims = state.registry.all().clone();
            let victims =
                self.strategy
                    .select_victims(&victims, required, current, hard_limit);

            let freed: f64 = victims
                .iter()
                .filter_map(|id| state.registry.get(id))
                .map(|m| m.size_gb)
                .sum();

            // Refuse to partially evict: if the plan falls short, nobody is
            // touched and the caller gets an explicit failure.
            if current + required - freed > hard_limit {
                return Err(VramError::OverBudget {
                    required_gb: required,
                    available_gb: (hard_limit - current) + freed,
                });
            }

            self.evict_victims(&mut state, &victims).await;
        }

        if required >= FLUSH_THRESHOLD_GB {
            self.monitor.flush_cache().await;
        }

        let outcome = self.backends.load(&capability).await?;
        let is_external = outcome == LoadOutcome::External;
        state
            .registry
            .register(model_id, capability.backend, required, priority, is_external);

        info!(
            %model_id,
            backend = %capability.backend,
            size_gb = required,
            %priority,
            is_external,
            "model resident"
        );
        Ok(())
    }

    async fn evict_victims(&self, state: &mut State, victims: &[String]) {
        let mut touched_backends = Vec::new();
        for victim in victims {
            let Some(model) = state.registry.get(victim).cloned() else {
                continue;
            };
            match self.backends.unload(victim, model.backend).await {
                Ok(()) => {
                    state.registry.unregister(victim);
                    if !touched_backends.contains(&model.backend) {
                        touched_backends.push(model.backend);
                    }
                    info!(model = %victim, size_gb = model.size_gb, "evicted");
                },
                Err(e) => {
                    // Keep the registration: the model is still resident as
                    // far as we know, and the budget must reflect that.
                    warn!(model = %victim, error = %e, "eviction unload failed");
                },
            }
        }
        for backend in touched_backends {
            if let Err(e) = self.backends.cleanup(backend).await {
                warn!(%backend, error = %e, "post-eviction cleanup failed");
            }
        }
    }

    /// Unload a model and drop its registration.
    ///
    /// # Errors
    ///
    /// Returns [`VramError::Backend`] if the backend rejects the unload; the
    /// registration is kept in that case.
    pub async fn mark_unloaded(&self, model_id: &str) -> VramResult<()> {
        let mut state = self.state.lock().await;
        let Some(model) = state.registry.get(model_id).cloned() else {
            debug!(%model_id, "mark_unloaded for unknown model");
            return Ok(());
        };

        if !model.is_external {
            self.backends.unload(model_id, model.backend).await?;
            if let Err(e) = self.backends.cleanup(model.backend).await {
                warn!(error = %e, "cleanup after unload failed");
            }
        }
        state.registry.unregister(model_id);
        info!(%model_id, "unloaded");
        Ok(())
    }

    /// Evict one model whose priority is at or below `below_priority`
    /// (lowest priority first, oldest access first). Returns the victim.
    pub async fn emergency_evict(&self, below_priority: ModelPriority) -> Option<String> {
        let mut state = self.state.lock().await;

        let mut candidates: Vec<LoadedModel> = state
            .registry
            .all()
            .values()
            .filter(|m| {
                !m.is_external
                    && m.priority != ModelPriority::Critical
                    && m.priority.eviction_rank() >= below_priority.eviction_rank()
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            b.priority
                .eviction_rank()
                .cmp(&a.priority.eviction_rank())
                .then(a.last_accessed.cmp(&b.last_accessed))
        });

        let victim = candidates.first()?.model_id.clone();
        warn!(model = %victim, "emergency eviction");
        self.evict_victims(&mut state, std::slice::from_ref(&victim)).await;
        (!state.registry.is_loaded(&victim)).then_some(victim)
    }

    /// Record a crash for a model. When a CRITICAL model crosses the crash
    /// threshold, the fallback hook (profile circuit breaker) fires.
    pub async fn record_crash(&self, model_id: &str, reason: &str) -> CrashStatus {
        let (status, is_critical) = {
            let mut state = self.state.lock().await;
            let status = state.crashes.record_crash(model_id, reason);
            let is_critical = self
                .profiles
                .active()
                .capability(model_id)
                .is_some_and(|cap| cap.priority == ModelPriority::Critical);
            (status, is_critical)
        };

        if status.needs_protection && is_critical {
            // Fired outside the state lock: the hook switches profiles and
            // must not deadlock against concurrent admissions.
            self.fallback
                .on_circuit_breaker(model_id, status.crash_count)
                .await;
        }
        status
    }

    /// Crash status for a model without recording anything.
    pub async fn crash_status(&self, model_id: &str) -> CrashStatus {
        self.state.lock().await.crashes.check(model_id)
    }

    /// Clear a model's crash history (admin action).
    pub async fn clear_crashes(&self, model_id: &str) {
        self.state.lock().await.crashes.clear(model_id);
    }

    /// Point-in-time status snapshot.
    pub async fn status(&self) -> VramStatus {
        let (mut loaded, model_usage_gb) = {
            let state = self.state.lock().await;
            let now = chrono::Utc::now();
            let loaded: Vec<LoadedModelStatus> = state
                .registry
                .all()
                .values()
                .map(|m| LoadedModelStatus {
                    model_id: m.model_id.clone(),
                    backend: m.backend.to_string(),
                    size_gb: m.size_gb,
                    priority: m.priority.to_string(),
                    is_external: m.is_external,
                    idle_secs: (now - m.last_accessed).num_seconds(),
                })
                .collect();
            (loaded, state.registry.manageable_usage_gb())
        };
        loaded.sort_by(|a, b| a.model_id.cmp(&b.model_id));

        let memory = self.monitor.status().await;
        let hard_limit_gb = self.profiles.active().vram_hard_limit_gb;
        let usage_pct = if hard_limit_gb > 0.0 {
            (model_usage_gb / hard_limit_gb) * 100.0
        } else {
            0.0
        };

        VramStatus {
            loaded_models: loaded,
            total_gb: memory.total_gb,
            used_gb: memory.used_gb,
            available_gb: memory.available_gb,
            model_usage_gb,
            usage_pct,
            hard_limit_gb,
            psi: memory.psi,
        }
    }

    /// Whether a model is currently registered as loaded.
    pub async fn is_loaded(&self, model_id: &str) -> bool {
        self.state.lock().await.registry.is_loaded(model_id)
    }

    /// Test helper: backdate a model's last access so eviction ordering can
    /// be exercised deterministically.
    #[cfg(test)]
    pub(crate) async fn backdate_access(&self, model_id: &str, secs: i64) {
        let mut state = self.state.lock().await;
        let when = chrono::Utc::now() - chrono::Duration::seconds(secs);
        state.registry.set_last_accessed(model_id, when);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendManager;
    use crate::eviction::HybridEviction;
    use crate::monitor::MemoryStatus;
    use std::sync::Mutex as StdMutex;
    use strato_profile::{BackendKind, ModelCapability};

    struct FakeMonitor;

    #[async_trait]
    impl MemoryMonitor for FakeMonitor {
        async fn status(&self) -> MemoryStatus {
            MemoryStatus {
                total_gb: 128.0,
                used_gb: 50.0,
                available_gb: 78.0,
                psi: PsiMetrics::default(),
            }
        }

        async fn pressure(&self) -> PsiMetrics {
            PsiMetrics::default()
        }

        async fn flush_cache(&self) {}
    }

    #[derive(Default)]
    struct FakeBackend {
        unloaded: StdMutex<Vec<String>>,
        external: bool,
    }

    #[async_trait]
    impl BackendManager for FakeBackend {
        fn supports(&self, _backend: BackendKind) -> bool {
            true
        }

        async fn load(&self, _capability: &ModelCapability) -> VramResult<LoadOutcome> {
            Ok(if self.external {
                LoadOutcome::External
            } else {
                LoadOutcome::Loaded
            })
        }

        async fn unload(&self, model_id: &str, _backend: BackendKind) -> VramResult<()> {
            self.unloaded.lock().unwrap().push(model_id.to_string());
            Ok(())
        }

        async fn cleanup(&self, _backend: BackendKind) -> VramResult<()> {
            Ok(())
        }
    }

    struct RecordingHook {
        fired: StdMutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl FallbackHook for RecordingHook {
        async fn on_circuit_breaker(&self, model_id: &str, crash_count: usize) {
            self.fired
                .lock()
                .unwrap()
                .push((model_id.to_string(), crash_count));
        }
    }

    fn orchestrator_with(
        backend: Arc<FakeBackend>,
        hook: Arc<dyn FallbackHook>,
    ) -> VramOrchestrator {
        let profiles = Arc::new(ProfileRegistry::with_builtin("performance").unwrap());
        VramOrchestrator::new(
            Arc::new(FakeMonitor),
            Box::new(HybridEviction),
            backend,
            profiles,
            hook,
        )
    }

    fn orchestrator() -> VramOrchestrator {
        orchestrator_with(Arc::new(FakeBackend::default()), Arc::new(NoFallback))
    }

    #[tokio::test]
    async fn test_load_fits_no_eviction() {
        let orch = orchestrator();
        orch.ensure_loaded("gpt-oss:20b", None).await.unwrap();

        let status = orch.status().await;
        assert_eq!(status.loaded_models.len(), 1);
        assert!((status.model_usage_gb - 13.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_already_loaded_is_touch() {
        let orch = orchestrator();
        orch.ensure_loaded("qwen3:4b", None).await.unwrap();
        orch.ensure_loaded("qwen3:4b", None).await.unwrap();
        assert_eq!(orch.status().await.loaded_models.len(), 1);
    }

    #[tokio::test]
    async fn test_eviction_protects_critical() {
        // CRITICAL 60GB old + LOW 30GB fresh under hard=110; loading 24GB
        // needs 4GB freed. Hybrid must pick LOW, never CRITICAL.
        let backend = Arc::new(FakeBackend::default());
        let orch = orchestrator_with(Arc::clone(&backend), Arc::new(NoFallback));

        orch.ensure_loaded("gpt-oss:120b", Some(ModelPriority::Critical))
            .await
            .unwrap();
        orch.ensure_loaded("nemotron-3-nano:30b", Some(ModelPriority::Low))
            .await
            .unwrap();
        orch.backdate_access("gpt-oss:120b", 100).await;
        orch.backdate_access("nemotron-3-nano:30b", 10).await;

        // 65 + 24 = 89 loaded; hard limit 110; load 42GB → needs 21 freed.
        orch.ensure_loaded("deepseek-r1:70b", None).await.unwrap();

        assert!(!orch.is_loaded("nemotron-3-nano:30b").await);
        assert!(orch.is_loaded("gpt-oss:120b").await);
        assert!(orch.is_loaded("deepseek-r1:70b").await);
        assert_eq!(
            backend.unloaded.lock().unwrap().as_slice(),
            ["nemotron-3-nano:30b"]
        );
    }

    #[tokio::test]
    async fn test_over_budget_refuses_partial_eviction() {
        let orch = orchestrator();
        orch.ensure_loaded("gpt-oss:120b", Some(ModelPriority::Critical))
            .await
            .unwrap();
        orch.ensure_loaded("magistral:24b", Some(ModelPriority::Critical))
            .await
            .unwrap();

        // 65 + 14 = 79 loaded, all CRITICAL; a 74GB load needs 43GB freed
        // but nothing is evictable, so it must fail whole.
        let err = orch.ensure_loaded("devstral-2:123b", None).await.unwrap_err();
        assert!(matches!(err, VramError::OverBudget { .. }));
        assert!(orch.is_loaded("gpt-oss:120b").await);
        assert!(orch.is_loaded("magistral:24b").await);
        assert!(!orch.is_loaded("devstral-2:123b").await);
    }

    #[tokio::test]
    async fn test_external_model_excluded_from_budget() {
        let backend = Arc::new(FakeBackend {
            external: true,
            ..FakeBackend::default()
        });
        let orch = orchestrator_with(backend, Arc::new(NoFallback));

        orch.ensure_loaded("gpt-oss:120b", None).await.unwrap();
        let status = orch.status().await;
        assert!(status.loaded_models[0].is_external);
        assert!((status.model_usage_gb).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_circuit_breaker_fires_for_critical_model() {
        let hook = Arc::new(RecordingHook {
            fired: StdMutex::new(Vec::new()),
        });
        let orch = orchestrator_with(Arc::new(FakeBackend::default()), Arc::clone(&hook) as _);

        // gpt-oss:120b is CRITICAL in the performance profile.
        orch.record_crash("gpt-oss:120b", "earlyoom_kill").await;
        assert!(hook.fired.lock().unwrap().is_empty());

        let status = orch.record_crash("gpt-oss:120b", "generation_failure").await;
        assert!(status.needs_protection);
        assert_eq!(
            hook.fired.lock().unwrap().as_slice(),
            [("gpt-oss:120b".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_circuit_breaker_ignores_normal_model() {
        let hook = Arc::new(RecordingHook {
            fired: StdMutex::new(Vec::new()),
        });
        let orch = orchestrator_with(Arc::new(FakeBackend::default()), Arc::clone(&hook) as _);

        orch.record_crash("qwen3:4b", "oom").await;
        orch.record_crash("qwen3:4b", "oom").await;
        assert!(hook.fired.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_circuit_open_blocks_load() {
        let orch = orchestrator();
        orch.record_crash("qwen3:4b", "oom").await;
        orch.record_crash("qwen3:4b", "oom").await;

        let err = orch.ensure_loaded("qwen3:4b", None).await.unwrap_err();
        assert!(matches!(err, VramError::CircuitOpen(_)));

        orch.clear_crashes("qwen3:4b").await;
        orch.ensure_loaded("qwen3:4b", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_emergency_evict_picks_lowest_oldest() {
        let orch = orchestrator();
        orch.ensure_loaded("qwen3:4b", Some(ModelPriority::Low)).await.unwrap();
        orch.ensure_loaded("magistral:24b", Some(ModelPriority::Normal))
            .await
            .unwrap();
        orch.backdate_access("qwen3:4b", 50).await;

        let victim = orch.emergency_evict(ModelPriority::Normal).await;
        assert_eq!(victim.as_deref(), Some("qwen3:4b"));
        assert!(!orch.is_loaded("qwen3:4b").await);
    }

    #[tokio::test]
    async fn test_mark_unloaded() {
        let orch = orchestrator();
        orch.ensure_loaded("qwen3:4b", None).await.unwrap();
        orch.mark_unloaded("qwen3:4b").await.unwrap();
        assert!(!orch.is_loaded("qwen3:4b").await);
        // Unknown model is a no-op.
        orch.mark_unloaded("missing").await.unwrap();
    }
}
