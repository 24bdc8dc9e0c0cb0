//! The composition root.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::RwLock;
use tracing::info;

use crate::auth::AuthVerifier;
use crate::processor::TurnProcessor;
use strato_config::{MaintenanceMode, Settings};
use strato_core::{StratoError, StratoResult, UserId, UserRecord};
use strato_health::{
    FileJanitor, HealthChecker, HealthCheckerConfig, LogCleanup, MetricsWriter, ServiceProbe,
    SystemSnapshotSource,
};
use strato_hub::SessionHub;
use strato_llm::{ChatClient, OllamaClient, OpenAiCompatClient, estimate_tokens};
use strato_pipeline::{
    AgentLoop, ArtifactDetector, ArtifactExtractor, ExtractionRouter, ImageExtractor,
    PdfExtractor, PromptComposer, Summarizer, TextExtractor,
};
use strato_profile::{BackendKind, HttpRecoveryProbe, ProfileManager, ProfileRegistry};
use strato_queue::{QueueConfig, QueuedRequest, RequestQueue, WorkerPool, spawn_visibility_monitor};
use strato_router::{PreferenceResolver, Router};
use strato_storage::{ConversationStore, Database, MetricsStore, UserStore};
use strato_tools::{
    AskUserTool, BrainFetchTool, BrainSearchTool, ExecuteCommandTool, GenerateImageTool,
    GetFileContentTool, ListAttachmentsTool, ReadFileTool, RecallTool, RememberTool, RunCodeTool,
    ServiceEndpoints, ToolRegistry, WebFetchTool, WebSearchTool, WriteFileTool,
};
use strato_vram::{
    CompositeBackendManager, FallbackHook, OllamaBackendManager, SglangBackendManager,
    UnifiedMemoryMonitor, VramOrchestrator, strategy_by_name,
};

/// Typed references to every subsystem, passed to handlers explicitly.
pub struct AppContext {
    /// Runtime settings.
    pub settings: Settings,
    /// Profile registry.
    pub profiles: Arc<ProfileRegistry>,
    /// Circuit-breaker fallback coordinator.
    pub profile_manager: Arc<ProfileManager>,
    /// VRAM orchestrator.
    pub vram: Arc<VramOrchestrator>,
    /// Request queue.
    pub queue: Arc<RequestQueue>,
    /// Session hub.
    pub hub: Arc<SessionHub>,
    /// Ollama client (chat + load control).
    pub ollama: Arc<OllamaClient>,
    /// SGLang client.
    pub sglang: Arc<OpenAiCompatClient>,
    /// Route classifier.
    pub router: Arc<Router>,
    /// Preference resolution chokepoint.
    pub resolver: PreferenceResolver,
    /// Tool registry.
    pub tools: Arc<ToolRegistry>,
    /// Agent loop.
    pub agent: Arc<AgentLoop>,
    /// Artifact intent detector.
    pub detector: Arc<ArtifactDetector>,
    /// Artifact extractor.
    pub artifact_extractor: Arc<ArtifactExtractor>,
    /// Conversation summarizer.
    pub summarizer: Arc<Summarizer>,
    /// Upload-time content extraction.
    pub extraction: Arc<ExtractionRouter>,
    /// Prompt composer.
    pub composer: PromptComposer,
    /// Conversation store.
    pub conversations: ConversationStore,
    /// User store.
    pub users: UserStore,
    /// Metrics store.
    pub metrics: MetricsStore,
    /// Health checker.
    pub health: Arc<HealthChecker>,
    /// Current maintenance mode.
    pub maintenance: RwLock<MaintenanceMode>,
    /// Token verifier.
    pub verifier: Arc<dyn AuthVerifier>,
    /// External tool service endpoints.
    pub endpoints: ServiceEndpoints,
    /// Turn processor, set once the worker pool starts.
    processor: std::sync::OnceLock<Arc<TurnProcessor>>,
}

impl AppContext {
    /// Wire every subsystem together.
    ///
    /// # Errors
    ///
    /// Fails when the initial profile is invalid or storage cannot open.
    pub async fn build(
        settings: Settings,
        verifier: Arc<dyn AuthVerifier>,
    ) -> anyhow::Result<Arc<Self>> {
        let profiles = Arc::new(ProfileRegistry::with_builtin(&settings.profile)?);

        let profile_manager = Arc::new(ProfileManager::new(
            Arc::clone(&profiles),
            Arc::new(HttpRecoveryProbe::new(&settings.sglang_endpoint)),
        ));

        let ollama = Arc::new(OllamaClient::new(&settings.ollama_host));
        let sglang = Arc::new(OpenAiCompatClient::sglang(&settings.sglang_endpoint));

        let backends = Arc::new(CompositeBackendManager::new(vec![
            Box::new(OllamaBackendManager::new(Arc::clone(&ollama))),
            Box::new(SglangBackendManager::new(&settings.sglang_endpoint)),
        ]));
        let vram = Arc::new(
            VramOrchestrator::new(
                Arc::new(UnifiedMemoryMonitor::new()),
                strategy_by_name(&settings.eviction_strategy),
                backends,
                Arc::clone(&profiles),
                Arc::clone(&profile_manager) as Arc<dyn FallbackHook>,
            )
            .with_crash_policy(
                settings.vram_crash_threshold,
                settings.vram_crash_window.as_secs(),
            ),
        );

        let queue = Arc::new(RequestQueue::new(QueueConfig {
            max_size: settings.max_queue_size,
            visibility_timeout: settings.visibility_timeout,
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
        }));

        let database = match &settings.storage_path {
            Some(path) => Database::connect_embedded(&path.to_string_lossy()).await?,
            None => Database::connect_memory().await?,
        };
        let conversations = ConversationStore::new(database.clone());
        let users = UserStore::new(database.clone());
        let metrics = MetricsStore::new(database);

        let ollama_chat: Arc<dyn ChatClient> = Arc::clone(&ollama) as Arc<dyn ChatClient>;
        let router = Arc::new(Router::new(Arc::clone(&ollama_chat), Arc::clone(&profiles)));
        let detector = Arc::new(ArtifactDetector::new(Arc::clone(&ollama_chat)));
        let artifact_extractor = Arc::new(ArtifactExtractor::new(Arc::clone(&ollama_chat)));
        let summarizer = Arc::new(Summarizer::new(
            Arc::clone(&ollama_chat),
            conversations.clone(),
        ));

        let mut extraction = ExtractionRouter::new();
        extraction.register(Arc::new(ImageExtractor::new(
            Arc::clone(&ollama_chat),
            Arc::clone(&profiles),
        )));
        extraction.register(Arc::new(PdfExtractor));
        extraction.register(Arc::new(TextExtractor));
        let extraction = Arc::new(extraction);

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(AskUserTool));
        tools.register(Arc::new(ReadFileTool));
        tools.register(Arc::new(WriteFileTool));
        tools.register(Arc::new(ListAttachmentsTool));
        tools.register(Arc::new(GetFileContentTool));
        tools.register(Arc::new(ExecuteCommandTool));
        tools.register(Arc::new(RunCodeTool));
        tools.register(Arc::new(WebSearchTool));
        tools.register(Arc::new(WebFetchTool));
        tools.register(Arc::new(BrainSearchTool));
        tools.register(Arc::new(BrainFetchTool));
        tools.register(Arc::new(RememberTool));
        tools.register(Arc::new(RecallTool));
        tools.register(Arc::new(GenerateImageTool));
        let tools = Arc::new(tools);
        let agent = Arc::new(AgentLoop::new(Arc::clone(&tools)));

        let health = Arc::new(HealthChecker::new(
            vec![
                ServiceProbe::new("ollama", format!("{}/api/version", settings.ollama_host)),
                ServiceProbe::new("sglang", format!("{}/health", settings.sglang_endpoint))
                    .non_critical(),
            ],
            HealthCheckerConfig {
                interval: settings.health_check_interval,
                alert_threshold: settings.health_alert_threshold,
                alert_cooldown: settings.health_alert_cooldown,
            },
        ));

        let maintenance = RwLock::new(settings.maintenance_mode);
        info!(profile = %settings.profile, "application context built");

        Ok(Arc::new(Self {
            endpoints: ServiceEndpoints::default(),
            processor: std::sync::OnceLock::new(),
            maintenance,
            settings,
            profiles,
            profile_manager,
            vram,
            queue,
            hub: Arc::new(SessionHub::new()),
            ollama,
            sglang,
            router,
            resolver: PreferenceResolver::new(),
            tools,
            agent,
            detector,
            artifact_extractor,
            summarizer,
            extraction,
            composer: PromptComposer::new(),
            conversations,
            users,
            metrics,
            health,
            verifier,
        }))
    }

    /// Chat client responsible for a backend.
    #[must_use]
    pub fn client_for(&self, backend: BackendKind) -> Arc<dyn ChatClient> {
        match backend {
            BackendKind::Ollama | BackendKind::Tensorrt => {
                Arc::clone(&self.ollama) as Arc<dyn ChatClient>
            },
            BackendKind::Sglang | BackendKind::Vllm => {
                Arc::clone(&self.sglang) as Arc<dyn ChatClient>
            },
        }
    }

    /// Current maintenance mode.
    #[must_use]
    pub fn maintenance_mode(&self) -> MaintenanceMode {
        self.maintenance.read().map(|m| *m).unwrap_or_default()
    }

    /// Change maintenance mode.
    pub fn set_maintenance_mode(&self, mode: MaintenanceMode) {
        if let Ok(mut guard) = self.maintenance.write() {
            *guard = mode;
        }
    }

    /// Load the user for a request, creating a standard account on first
    /// contact and applying the weekly budget rollover.
    ///
    /// # Errors
    ///
    /// `Forbidden` for banned users; storage errors pass through.
    pub async fn load_or_create_user(&self, user_id: &UserId) -> StratoResult<UserRecord> {
        let mut user = match self.users.get(user_id).await? {
            Some(user) => user,
            None => {
                let record = UserRecord::new(
                    user_id.clone(),
                    format!("user_{}", &user_id.as_str().chars().take(8).collect::<String>()),
                    self.settings.default_weekly_budget,
                );
                self.users.save(record.clone()).await?;
                record
            },
        };

        if user.banned {
            return Err(StratoError::Forbidden);
        }
        if user.maybe_reset_week(chrono::Utc::now()) {
            self.users.save(user.clone()).await?;
        }
        Ok(user)
    }

    /// Shared submission path for WS and REST: maintenance gate, budget
    /// gate, capacity gate, then enqueue.
    ///
    /// # Errors
    ///
    /// `MaintenanceActive`, `TokenBudgetExceeded`, `QueueFull`, `Forbidden`,
    /// or a storage error.
    pub async fn submit(&self, mut request: QueuedRequest) -> StratoResult<(QueuedRequest, usize)> {
        if self.maintenance_mode() == MaintenanceMode::Hard {
            return Err(StratoError::MaintenanceActive(
                self.settings.maintenance_message.clone(),
            ));
        }

        let user = self.load_or_create_user(&request.user_id).await?;
        request.tier = user.tier;
        request.estimated_tokens = estimate_tokens(&request.message);

        if user.tokens_remaining() < request.estimated_tokens {
            return Err(StratoError::TokenBudgetExceeded {
                remaining: user.tokens_remaining(),
            });
        }

        if self.queue.is_full() {
            return Err(StratoError::QueueFull);
        }

        let id = self.queue.enqueue(request.clone()).await?;
        let position = self.queue.position(&id).await;
        Ok((request, position))
    }

    /// Spawn every background loop. Handles are detached; the process
    /// lifetime bounds them.
    pub fn spawn_background(self: &Arc<Self>) {
        let processor = Arc::new(TurnProcessor::new(Arc::clone(self)));
        let _ = self.processor.set(Arc::clone(&processor));
        let mut pool = WorkerPool::new(Arc::clone(&self.queue), processor);
        pool.start(self.settings.worker_count);
        // Workers run for the process lifetime.
        std::mem::forget(pool);

        let _ = spawn_visibility_monitor(
            Arc::clone(&self.queue),
            std::time::Duration::from_secs(10),
        );
        let _ = self.health.spawn();
        let _ = self
            .profile_manager
            .spawn_recovery_poller(std::time::Duration::from_secs(15));

        let writer = Arc::new(MetricsWriter::new(
            self.metrics.clone(),
            Arc::clone(self) as Arc<dyn SystemSnapshotSource>,
            Arc::clone(&self.health),
            self.settings.metrics_write_interval,
            self.settings.metrics_retention_days,
        ));
        let _ = writer.spawn();

        let _ = LogCleanup::new(
            self.settings.log_base_dir.clone(),
            self.settings.log_retention_days,
            self.settings.log_cleanup_interval_hours,
        )
        .spawn();
        let _ = FileJanitor::new(
            self.settings.temp_upload_dir.clone(),
            self.settings.temp_artifact_dir.clone(),
        )
        .spawn();

        info!(workers = self.settings.worker_count, "background loops started");
    }

    /// Cancel a request: queued entries directly, in-flight turns via their
    /// cancellation token. Returns whether anything was cancelled.
    pub async fn cancel_request(&self, request_id: &strato_core::RequestId) -> bool {
        if self.queue.cancel(request_id).await {
            return true;
        }
        self.processor
            .get()
            .is_some_and(|p| p.cancel_inflight(request_id))
    }

    /// Snapshot for the monitoring SSE stream.
    pub async fn monitoring_snapshot(&self) -> Value {
        let vram = self.vram.status().await;
        let fallback = self.profile_manager.status().await;
        let services = self.health.snapshot().await;

        json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "vram": {
                "total_gb": vram.total_gb,
                "used_gb": vram.used_gb,
                "available_gb": vram.available_gb,
                "model_usage_gb": vram.model_usage_gb,
                "usage_pct": vram.usage_pct,
                "psi_some_avg10": vram.psi.some_avg10,
                "psi_full_avg10": vram.psi.full_avg10,
                "loaded_models": vram.loaded_models,
            },
            "queue_size": self.queue.size(),
            "gpu": {"unified_memory": true},
            "cpu_utilization": 0.0,
            "maintenance_mode": self.maintenance_mode() != MaintenanceMode::Off,
            "fallback": fallback,
            "profile": self.profiles.active_name(),
            "services": services,
        })
    }
}

#[async_trait]
impl SystemSnapshotSource for AppContext {
    async fn system_snapshot(&self) -> Value {
        self.monitoring_snapshot().await
    }
}
