//! Backend-specific load/unload managers.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{VramError, VramResult};
use strato_llm::OllamaClient;
use strato_profile::{BackendKind, ModelCapability};

/// Outcome of asking a backend to make a model resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The backend loaded the model under orchestrator control.
    Loaded,
    /// The model is served by an external process; register it as external
    /// (excluded from budget and eviction).
    External,
}

/// Per-backend load/unload operations.
#[async_trait]
pub trait BackendManager: Send + Sync {
    /// Whether this manager handles `backend`.
    fn supports(&self, backend: BackendKind) -> bool;

    /// Make the model resident.
    async fn load(&self, capability: &ModelCapability) -> VramResult<LoadOutcome>;

    /// Unload the model.
    async fn unload(&self, model_id: &str, backend: BackendKind) -> VramResult<()>;

    /// Release backend-level resources after unloads (shared memory, etc.).
    async fn cleanup(&self, backend: BackendKind) -> VramResult<()>;
}

/// Manager for Ollama-served models.
pub struct OllamaBackendManager {
    client: Arc<OllamaClient>,
}

impl OllamaBackendManager {
    /// Create a manager over an Ollama client.
    #[must_use]
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self { client }
    }

    /// Remove orphaned SysV shared-memory segments Ollama leaves behind
    /// after an unload. Best effort; failures are logged and swallowed.
    async fn cleanup_shared_memory(&self) {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("ipcs -m | awk 'NR>3 && $6 == 0 {print $2}'")
            .output()
            .await;

        let Ok(out) = output else {
            debug!("ipcs unavailable, skipping shared-memory cleanup");
            return;
        };
        if !out.status.success() {
            return;
        }

        for segment in String::from_utf8_lossy(&out.stdout).split_whitespace() {
            let result = tokio::process::Command::new("ipcrm")
                .arg("-m")
                .arg(segment)
                .output()
                .await;
            match result {
                Ok(r) if r.status.success() => {
                    debug!(segment, "removed orphan shared-memory segment");
                },
                Ok(_) | Err(_) => warn!(segment, "could not remove shared-memory segment"),
            }
        }
    }
}

#[async_trait]
impl BackendManager for OllamaBackendManager {
    fn supports(&self, backend: BackendKind) -> bool {
        backend == BackendKind::Ollama
    }

    async fn load(&self, capability: &ModelCapability) -> VramResult<LoadOutcome> {
        info!(model = %capability.name, keep_alive = %capability.keep_alive, "loading via Ollama");
        self.client
            .load_model(&capability.name, &capability.keep_alive)
            .await
            .map_err(|e| VramError::Backend {
                backend: "ollama".to_string(),
                message: e.to_string(),
            })?;
        Ok(LoadOutcome::Loaded)
    }

    async fn unload(&self, model_id: &str, backend: BackendKind) -> VramResult<()> {
        if backend != BackendKind::Ollama {
            return Err(VramError::UnsupportedBackend(backend.to_string()));
        }
        info!(model = %model_id, "unloading via Ollama");
        self.client
            .unload_model(model_id)
            .await
            .map_err(|e| VramError::Backend {
                backend: "ollama".to_string(),
                message: e.to_string(),
            })
    }

    async fn cleanup(&self, backend: BackendKind) -> VramResult<()> {
        if backend != BackendKind::Ollama {
            return Err(VramError::UnsupportedBackend(backend.to_string()));
        }
        self.cleanup_shared_memory().await;
        Ok(())
    }
}

/// Manager for SGLang-served models.
///
/// SGLang servers are started outside the orchestrator and pin their model
/// for their whole lifetime; "loading" here means confirming the server is
/// up, and the model registers as external.
pub struct SglangBackendManager {
    client: reqwest::Client,
    endpoint: String,
}

impl SglangBackendManager {
    /// Create a manager probing `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    async fn is_up(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl BackendManager for SglangBackendManager {
    fn supports(&self, backend: BackendKind) -> bool {
        backend == BackendKind::Sglang
    }

    async fn load(&self, capability: &ModelCapability) -> VramResult<LoadOutcome> {
        if self.is_up().await {
            info!(model = %capability.name, "SGLang server healthy, registering as external");
            Ok(LoadOutcome::External)
        } else {
            Err(VramError::Backend {
                backend: "sglang".to_string(),
                message: format!("server at {} is not responding", self.endpoint),
            })
        }
    }

    async fn unload(&self, model_id: &str, backend: BackendKind) -> VramResult<()> {
        if backend != BackendKind::Sglang {
            return Err(VramError::UnsupportedBackend(backend.to_string()));
        }
        // The orchestrator does not own the SGLang process; dropping the
        // registration is all an unload means here.
        debug!(model = %model_id, "SGLang models are externally managed; nothing to unload");
        Ok(())
    }

    async fn cleanup(&self, backend: BackendKind) -> VramResult<()> {
        if backend != BackendKind::Sglang {
            return Err(VramError::UnsupportedBackend(backend.to_string()));
        }
        Ok(())
    }
}

/// Dispatches to the manager that supports a model's backend.
pub struct CompositeBackendManager {
    managers: Vec<Box<dyn BackendManager>>,
}

impl CompositeBackendManager {
    /// Compose a set of per-backend managers.
    #[must_use]
    pub fn new(managers: Vec<Box<dyn BackendManager>>) -> Self {
        Self { managers }
    }

    fn find(&self, backend: BackendKind) -> VramResult<&dyn BackendManager> {
        self.managers
            .iter()
            .map(AsRef::as_ref)
            .find(|m| m.supports(backend))
            .ok_or_else(|| VramError::UnsupportedBackend(backend.to_string()))
    }
}

#[async_trait]
impl BackendManager for CompositeBackendManager {
    fn supports(&self, backend: BackendKind) -> bool {
        self.managers.iter().any(|m| m.supports(backend))
    }

    async fn load(&self, capability: &ModelCapability) -> VramResult<LoadOutcome> {
        self.find(capability.backend)?.load(capability).await
    }

    async fn unload(&self, model_id: &str, backend: BackendKind) -> VramResult<()> {
        self.find(backend)?.unload(model_id, backend).await
    }

    async fn cleanup(&self, backend: BackendKind) -> VramResult<()> {
        self.find(backend)?.cleanup(backend).await
    }
}
