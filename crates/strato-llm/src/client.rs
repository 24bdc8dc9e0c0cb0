//! The [`ChatClient`] trait.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::LlmResult;
use crate::types::{ChatMessage, ChatResponse, StreamEvent, ToolDefinition};

/// Boxed stream of generation events.
pub type StreamBox = Pin<Box<dyn Stream<Item = LlmResult<StreamEvent>> + Send>>;

/// How to drive a model's thinking mode for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ThinkingDirective {
    /// Leave the model's default behavior untouched.
    #[default]
    ModelDefault,
    /// Boolean on/off (`think: true/false`).
    Enabled(bool),
    /// Effort level for models with graded thinking ("low"/"medium"/"high").
    Level(String),
}

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f64,
    /// Backend keep-alive hint (e.g. "120s", "10m"); Ollama only.
    pub keep_alive: Option<String>,
    /// Thinking mode.
    pub thinking: ThinkingDirective,
    /// Maximum tokens to generate, when the backend supports a cap.
    pub max_tokens: Option<u64>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            keep_alive: None,
            thinking: ThinkingDirective::ModelDefault,
            max_tokens: None,
        }
    }
}

impl GenerationOptions {
    /// Options for deterministic classification calls.
    #[must_use]
    pub fn classification() -> Self {
        Self {
            temperature: 0.1,
            keep_alive: Some("120s".to_string()),
            ..Self::default()
        }
    }

    /// Set the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the keep-alive hint.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    /// Set the thinking directive.
    #[must_use]
    pub fn with_thinking(mut self, thinking: ThinkingDirective) -> Self {
        self.thinking = thinking;
        self
    }
}

/// A complete chat request.
///
/// The model travels with the request because the router and preference
/// resolver choose it per turn; clients are per-backend, not per-model.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model id.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,
    /// System prompt (empty to omit).
    pub system: String,
    /// Generation options.
    pub options: GenerationOptions,
}

impl ChatRequest {
    /// Create a request with default options and no tools.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            system: String::new(),
            options: GenerationOptions::default(),
        }
    }

    /// Attach tools.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Set the options.
    #[must_use]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// A chat-capable inference backend.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Backend name for logs and dispatch.
    fn name(&self) -> &str;

    /// Stream a generation.
    async fn stream(&self, request: ChatRequest) -> LlmResult<StreamBox>;

    /// Complete without streaming.
    async fn complete(&self, request: ChatRequest) -> LlmResult<ChatResponse>;

    /// One-shot prompt with no tools or history; returns the response text.
    ///
    /// Used by the router, artifact detector, and extractors, which only need
    /// a short answer from a small model.
    async fn complete_simple(
        &self,
        model: &str,
        prompt: &str,
        options: GenerationOptions,
    ) -> LlmResult<String> {
        let request = ChatRequest::new(model, vec![ChatMessage::user(prompt)])
            .with_options(options);
        let response = self.complete(request).await?;
        Ok(response.text().to_string())
    }
}

/// Allow `Box<dyn ChatClient>` wherever `C: ChatClient` is required.
#[async_trait]
impl ChatClient for Box<dyn ChatClient> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn stream(&self, request: ChatRequest) -> LlmResult<StreamBox> {
        (**self).stream(request).await
    }

    async fn complete(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        (**self).complete(request).await
    }
}
