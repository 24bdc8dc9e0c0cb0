//! Queued request records and status views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strato_core::{ArtifactSummary, ClientId, FileRef, RequestId, ThreadId, Tier, UserId};

/// A request waiting in, or moving through, the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedRequest {
    /// Assigned id.
    pub request_id: RequestId,
    /// When the request was accepted.
    pub enqueued_at: DateTime<Utc>,
    /// Processing attempts so far.
    pub attempt: u32,
    /// Requesting user.
    pub user_id: UserId,
    /// Conversation thread.
    pub thread_id: ThreadId,
    /// Raw user message.
    pub message: String,
    /// Frontend message id (for status edits).
    pub message_id: String,
    /// Frontend channel id.
    pub channel_id: String,
    /// Connected client to stream events to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<ClientId>,
    /// Attached files.
    #[serde(default)]
    pub file_refs: Vec<FileRef>,
    /// Admission tier.
    pub tier: Tier,
    /// Per-request model override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Per-request temperature override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Per-request thinking override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_enabled: Option<bool>,
    /// Interface the request arrived from ("discord", "web", "cli").
    pub interface: String,
    /// Token estimate made at enqueue time.
    pub estimated_tokens: u64,
}

impl QueuedRequest {
    /// Create a request with a fresh id, standard tier, and no overrides.
    pub fn new(
        user_id: UserId,
        thread_id: ThreadId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id: RequestId::new(),
            enqueued_at: Utc::now(),
            attempt: 0,
            user_id,
            thread_id,
            message: message.into(),
            message_id: String::new(),
            channel_id: String::new(),
            bot_id: None,
            file_refs: Vec::new(),
            tier: Tier::Standard,
            model: None,
            temperature: None,
            thinking_enabled: None,
            interface: "web".to_string(),
            estimated_tokens: 0,
        }
    }
}

/// Result recorded for a completed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// Final response text.
    pub response: String,
    /// Tokens consumed.
    pub tokens_used: u64,
    /// Artifacts produced.
    #[serde(default)]
    pub artifacts: Vec<ArtifactSummary>,
}

/// Terminal failure record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Human-readable error.
    pub error: String,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Whether this was a user cancellation.
    #[serde(default)]
    pub cancelled: bool,
    /// When the request failed.
    pub timestamp: DateTime<Utc>,
}

/// Status view for a request id.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting in the queue.
    Queued {
        /// 1-based position.
        position: usize,
    },
    /// Picked up by a worker.
    Processing,
    /// Finished successfully.
    Completed {
        /// Recorded result.
        result: ProcessOutcome,
    },
    /// Failed terminally (including cancellations).
    Failed {
        /// Failure details.
        error: FailureRecord,
    },
}
