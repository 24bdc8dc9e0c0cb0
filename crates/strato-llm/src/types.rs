//! Chat messages, tool definitions, and streaming events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: MessageRole,
    /// Message content.
    pub content: MessageContent,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message carrying an image for vision models.
    pub fn user_with_image(text: impl Into<String>, image_base64: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::TextWithImages {
                text: text.into(),
                images_base64: vec![image_base64.into()],
            },
        }
    }

    /// Create an assistant message carrying tool calls.
    #[must_use]
    pub fn assistant_with_tools(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::ToolCalls(tool_calls),
        }
    }

    /// Create a tool result message.
    #[must_use]
    pub fn tool_result(result: ToolCallResult) -> Self {
        Self {
            role: MessageRole::Tool,
            content: MessageContent::ToolResult(result),
        }
    }

    /// Text content, if this is a plain text message.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions.
    System,
    /// End user input.
    User,
    /// Model output.
    Assistant,
    /// Tool result fed back to the model.
    Tool,
}

/// Message content variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Tool calls emitted by the assistant.
    ToolCalls(Vec<ToolCall>),
    /// A tool result.
    ToolResult(ToolCallResult),
    /// Text plus base64 images (vision / OCR input).
    TextWithImages {
        /// Prompt text.
        text: String,
        /// Base64-encoded images.
        images_base64: Vec<String>,
    },
}

/// A tool call emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id, unique within the turn.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments object.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a call with empty arguments.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: Value::Object(serde_json::Map::new()),
        }
    }

    /// Attach arguments.
    #[must_use]
    pub fn with_arguments(mut self, args: Value) -> Self {
        self.arguments = args;
        self
    }
}

/// Result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The call this result answers.
    pub call_id: String,
    /// Result content (or error text).
    pub content: String,
    /// Whether the tool failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Successful result.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Failed result.
    pub fn error(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: error.into(),
            is_error: true,
        }
    }
}

/// Tool definition advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// JSON schema for the arguments object.
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Incremental event from a streaming generation.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Partial text.
    TextDelta(String),
    /// Reasoning/thinking delta (not forwarded to clients verbatim).
    ThinkingDelta(String),
    /// A complete tool call. Ollama delivers calls whole; the
    /// `OpenAI`-compatible path assembles argument deltas before emitting.
    ToolCall(ToolCall),
    /// Token usage for the turn.
    Usage(Usage),
    /// Generation finished.
    Done,
}

/// Full response from a non-streaming call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Response message (text or tool calls).
    pub message: ChatMessage,
    /// Tool calls, split out for convenience.
    pub tool_calls: Vec<ToolCall>,
    /// Why generation stopped.
    pub stop_reason: StopReason,
    /// Token usage.
    pub usage: Usage,
}

impl ChatResponse {
    /// Response text, empty for pure tool-call responses.
    #[must_use]
    pub fn text(&self) -> &str {
        self.message.text().unwrap_or("")
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Natural end of turn.
    EndTurn,
    /// Token limit reached.
    MaxTokens,
    /// The model requested tools.
    ToolUse,
}

/// Token usage for one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Generated tokens.
    pub output_tokens: u64,
}

impl Usage {
    /// Total tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Rough token estimate used for budget checks before a model is resident.
///
/// Four characters per token tracks the tokenizers of the supported model
/// families closely enough for budgeting.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::user("hi");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.text(), Some("hi"));

        let tools = ChatMessage::assistant_with_tools(vec![ToolCall::new("1", "web_search")]);
        assert!(tools.text().is_none());
    }

    #[test]
    fn test_tool_result_flags() {
        assert!(!ToolCallResult::success("1", "ok").is_error);
        assert!(ToolCallResult::error("1", "boom").is_error);
    }

    #[test]
    fn test_usage_total() {
        let usage = Usage { input_tokens: 10, output_tokens: 5 };
        assert_eq!(usage.total(), 15);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }
}
