//! Events streamed to connected clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RequestId;

/// Event sent to a client over WebSocket (or mirrored into SSE snapshots).
///
/// Within one request, `token` events arrive in generation order, a
/// `tool_call` always precedes its `tool_result`, and `result` is the final
/// event of a successful turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Handshake acknowledgement after connect.
    SessionStart {
        /// Server-assigned session id.
        session_id: String,
    },
    /// Request accepted into the queue.
    Queued {
        /// Assigned request id.
        request_id: RequestId,
        /// Position at enqueue time.
        queue_position: usize,
    },
    /// A worker picked the request up.
    Processing {
        /// Request being processed.
        request_id: RequestId,
    },
    /// Early status indicator (`*Thinking...*` style), animated client-side.
    EarlyStatus {
        /// Request the status belongs to.
        request_id: RequestId,
        /// Formatted status text.
        content: String,
        /// Channel the indicator targets.
        channel_id: String,
        /// Message the indicator replaces or follows.
        message_id: String,
    },
    /// Incremental generated text.
    Token {
        /// Request producing the token.
        request_id: RequestId,
        /// Token text.
        text: String,
    },
    /// The agent invoked a tool.
    ToolCall {
        /// Request in whose turn the tool ran.
        request_id: RequestId,
        /// Tool name.
        name: String,
        /// Tool arguments.
        args: Value,
    },
    /// A tool finished.
    ToolResult {
        /// Request in whose turn the tool ran.
        request_id: RequestId,
        /// Tool name.
        name: String,
        /// Whether the tool succeeded.
        success: bool,
    },
    /// The agent is asking the user a question (`ask_user`).
    UserQuestion {
        /// Request waiting on the answer.
        request_id: RequestId,
        /// Question text.
        question: String,
        /// Optional suggested answers.
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
        /// Seconds the agent will wait.
        timeout_secs: u64,
    },
    /// Final successful result of a turn.
    Result {
        /// Completed request.
        request_id: RequestId,
        /// Full response text.
        response: String,
        /// Tokens consumed by the turn.
        tokens_used: u64,
        /// Artifacts produced during postprocess.
        artifacts: Vec<ArtifactSummary>,
        /// Channel to deliver into.
        channel_id: String,
        /// Originating message id.
        message_id: String,
    },
    /// Terminal failure after retries.
    Failed {
        /// Failed request.
        request_id: RequestId,
        /// Human-readable error.
        error: String,
        /// Attempts made.
        attempts: u32,
    },
    /// Cancellation acknowledgement.
    Cancelled {
        /// Cancelled request.
        request_id: RequestId,
    },
    /// Ping response.
    Pong,
    /// Soft maintenance notice attached after `queued`.
    MaintenanceWarning {
        /// Operator-provided message.
        message: String,
    },
}

impl ClientEvent {
    /// Stable event type string (matches the serialized `type` tag).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::Queued { .. } => "queued",
            Self::Processing { .. } => "processing",
            Self::EarlyStatus { .. } => "early_status",
            Self::Token { .. } => "token",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::UserQuestion { .. } => "user_question",
            Self::Result { .. } => "result",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
            Self::Pong => "pong",
            Self::MaintenanceWarning { .. } => "maintenance_warning",
        }
    }
}

/// Artifact metadata attached to a `result` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSummary {
    /// Artifact id for download.
    pub artifact_id: String,
    /// Suggested filename.
    pub filename: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Artifact type tag.
    pub artifact_type: String,
}

/// Kinds of early status indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// File attachments are being extracted (OCR, PDF parse).
    ProcessingFiles,
    /// The request is queued and being routed.
    Thinking,
    /// Streaming failed; retrying with a non-streaming call.
    Retrying,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_matches_serde_tag() {
        let event = ClientEvent::Token {
            request_id: RequestId::new(),
            text: "hello".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
    }

    #[test]
    fn test_user_question_skips_empty_options() {
        let event = ClientEvent::UserQuestion {
            request_id: RequestId::new(),
            question: "Proceed?".to_string(),
            options: None,
            timeout_secs: 300,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("options"));
    }

    #[test]
    fn test_roundtrip() {
        let event = ClientEvent::Failed {
            request_id: RequestId::from_string("r-1"),
            error: "backend unavailable".to_string(),
            attempts: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "failed");
    }
}
