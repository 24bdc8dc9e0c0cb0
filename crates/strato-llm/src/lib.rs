#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Backend chat clients for the Strato orchestrator.
//!
//! Two client families cover the supported backends:
//! - [`OllamaClient`] speaks the native Ollama chat API (NDJSON streaming,
//!   `keep_alive`, thinking modes, vision payloads).
//! - [`OpenAiCompatClient`] speaks the `OpenAI` chat-completions protocol used
//!   by SGLang and vLLM servers.
//!
//! Both implement [`ChatClient`], which the pipeline consumes; the model is
//! chosen per request because the router and preference resolver decide it at
//! runtime, not at client construction.

mod client;
mod error;
mod ollama;
mod openai_compat;
mod types;

pub use client::{ChatClient, ChatRequest, GenerationOptions, StreamBox, ThinkingDirective};
pub use error::{LlmError, LlmResult};
pub use ollama::OllamaClient;
pub use openai_compat::OpenAiCompatClient;
pub use types::{
    ChatMessage, ChatResponse, MessageContent, MessageRole, StopReason, StreamEvent, ToolCall,
    ToolCallResult, ToolDefinition, Usage, estimate_tokens,
};
