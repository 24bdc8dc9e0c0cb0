//! Per-turn execution context.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use strato_core::{Artifact, ClientId, FileRef, RequestId, ThreadId, UserId};
use strato_hub::SessionHub;

/// Endpoints of the external collaborator services tools call into.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    /// Knowledge store (brain) service.
    pub brain: String,
    /// Web search service (SearxNG-compatible JSON API).
    pub search: String,
    /// Image generation service.
    pub image: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            brain: "http://localhost:8100".to_string(),
            search: "http://localhost:8888".to_string(),
            image: "http://localhost:8188".to_string(),
        }
    }
}

/// Everything a tool may touch during one turn.
///
/// Handed to the agent loop as a value object and to each tool as an
/// explicit argument. The cancellation token covers every suspension point
/// in the turn; `artifacts_created` collects files tools produce so the
/// final response can list them.
pub struct ExecutionContext {
    /// Request being processed.
    pub request_id: RequestId,
    /// Requesting user.
    pub user_id: UserId,
    /// Conversation thread.
    pub thread_id: ThreadId,
    /// Frontend channel id.
    pub channel_id: String,
    /// Frontend message id.
    pub message_id: String,
    /// Connected client to stream to, if any.
    pub bot_id: Option<ClientId>,
    /// Interface the request arrived from.
    pub interface: String,
    /// Turn cancellation token.
    pub cancel: CancellationToken,
    /// Session hub for events and `ask_user`.
    pub hub: Arc<SessionHub>,
    /// Files attached to the request.
    pub file_refs: Vec<FileRef>,
    /// Artifacts produced during the turn.
    pub artifacts_created: Mutex<Vec<Artifact>>,
    /// Directory artifacts are written into.
    pub artifact_dir: PathBuf,
    /// Scratch workspace for file tools.
    pub workspace_dir: PathBuf,
    /// External service endpoints.
    pub endpoints: ServiceEndpoints,
}

impl ExecutionContext {
    /// Record an artifact produced during this turn.
    pub async fn record_artifact(&self, artifact: Artifact) {
        self.artifacts_created.lock().await.push(artifact);
    }

    /// Artifacts produced so far.
    pub async fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts_created.lock().await.clone()
    }
}

/// Bare context for unit tests.
#[cfg(test)]
#[must_use]
pub(crate) fn test_context() -> ExecutionContext {
    ExecutionContext {
        request_id: RequestId::new(),
        user_id: UserId::new("test-user"),
        thread_id: ThreadId::new("test-thread"),
        channel_id: "chan".to_string(),
        message_id: "msg".to_string(),
        bot_id: None,
        interface: "cli".to_string(),
        cancel: CancellationToken::new(),
        hub: Arc::new(SessionHub::new()),
        file_refs: Vec::new(),
        artifacts_created: Mutex::new(Vec::new()),
        artifact_dir: std::env::temp_dir(),
        workspace_dir: std::env::temp_dir(),
        endpoints: ServiceEndpoints::default(),
    }
}
