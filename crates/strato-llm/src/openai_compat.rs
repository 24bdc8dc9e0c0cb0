//! `OpenAI`-compatible chat client for SGLang and vLLM servers.
//!
//! Both backends expose `/v1/chat/completions` with SSE streaming. Tool-call
//! arguments arrive as string deltas; they are assembled here and emitted as
//! whole [`StreamEvent::ToolCall`]s so the agent loop sees one vocabulary
//! regardless of backend.

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::client::{ChatClient, ChatRequest, StreamBox};
use crate::error::{LlmError, LlmResult};
use crate::types::{
    ChatMessage, ChatResponse, MessageContent, MessageRole, StopReason, StreamEvent, ToolCall,
    Usage,
};

/// Client for one `OpenAI`-compatible endpoint.
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    backend_name: String,
}

impl OpenAiCompatClient {
    /// Create a client for an SGLang server at `endpoint`
    /// (e.g. `http://localhost:30000`).
    #[must_use]
    pub fn sglang(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, "sglang")
    }

    /// Create a client for a vLLM server at `endpoint`.
    #[must_use]
    pub fn vllm(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, "vllm")
    }

    fn new(endpoint: impl Into<String>, backend_name: &str) -> Self {
        let base = endpoint.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url: format!("{base}/v1/chat/completions"),
            backend_name: backend_name.to_string(),
        }
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut messages = Vec::new();
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        for msg in &request.messages {
            messages.push(convert_message(msg));
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.options.temperature,
            "stream": stream,
        });
        if let Some(max) = request.options.max_tokens {
            body["max_tokens"] = json!(max);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        body
    }

    async fn post(&self, request: &ChatRequest, stream: bool) -> LlmResult<reqwest::Response> {
        let body = self.build_body(request, stream);
        debug!(model = %request.model, backend = %self.backend_name, stream, "chat request");

        let response = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            error!(backend = %self.backend_name, status, body = %text, "chat error");
            return Err(LlmError::HttpStatus { status, body: text });
        }
        Ok(response)
    }
}

fn convert_message(msg: &ChatMessage) -> Value {
    let role = match msg.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    };

    match &msg.content {
        MessageContent::Text(text) => json!({"role": role, "content": text}),
        MessageContent::TextWithImages { text, images_base64 } => {
            let mut parts = vec![json!({"type": "text", "text": text})];
            for image in images_base64 {
                parts.push(json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:image/png;base64,{image}")}
                }));
            }
            json!({"role": role, "content": parts})
        },
        MessageContent::ToolCalls(calls) => {
            let tool_calls: Vec<Value> = calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": serde_json::to_string(&c.arguments)
                                .unwrap_or_default(),
                        }
                    })
                })
                .collect();
            json!({"role": "assistant", "content": Value::Null, "tool_calls": tool_calls})
        },
        MessageContent::ToolResult(result) => {
            json!({"role": "tool", "tool_call_id": result.call_id, "content": result.content})
        },
    }
}

/// Partially assembled tool call from streaming deltas.
#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingCall {
    fn finish(self) -> Option<ToolCall> {
        if self.name.is_empty() {
            return None;
        }
        let arguments = if self.arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_str(&self.arguments) {
                Ok(v) => v,
                Err(e) => {
                    warn!(name = %self.name, error = %e, "dropping tool call with malformed arguments");
                    return None;
                },
            }
        };
        Some(ToolCall {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.backend_name
    }

    async fn stream(&self, request: ChatRequest) -> LlmResult<StreamBox> {
        let response = self.post(&request, true).await?;

        let stream = try_stream! {
            use futures::StreamExt;

            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            let mut pending: Option<PendingCall> = None;

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| LlmError::Streaming(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE events are separated by blank lines.
                while let Some(event_end) = buffer.find("\n\n") {
                    let event_data = buffer[..event_end].to_string();
                    buffer.drain(..event_end.saturating_add(2));

                    for line in event_data.lines() {
                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        if data.trim() == "[DONE]" {
                            if let Some(call) = pending.take().and_then(PendingCall::finish) {
                                yield StreamEvent::ToolCall(call);
                            }
                            yield StreamEvent::Done;
                            return;
                        }

                        let Ok(event) = serde_json::from_str::<SseChunk>(data) else {
                            continue;
                        };

                        if let Some(usage) = &event.usage {
                            yield StreamEvent::Usage(Usage {
                                input_tokens: usage.prompt_tokens,
                                output_tokens: usage.completion_tokens,
                            });
                        }

                        let Some(choice) = event.choices.first() else {
                            continue;
                        };

                        if let Some(content) = &choice.delta.content {
                            if !content.is_empty() {
                                yield StreamEvent::TextDelta(content.clone());
                            }
                        }
                        if let Some(reasoning) = &choice.delta.reasoning_content {
                            if !reasoning.is_empty() {
                                yield StreamEvent::ThinkingDelta(reasoning.clone());
                            }
                        }

                        if let Some(calls) = &choice.delta.tool_calls {
                            for delta in calls {
                                // A delta with an id starts a new call.
                                if delta.id.is_some() {
                                    if let Some(done) =
                                        pending.take().and_then(PendingCall::finish)
                                    {
                                        yield StreamEvent::ToolCall(done);
                                    }
                                    pending = Some(PendingCall {
                                        id: delta
                                            .id
                                            .clone()
                                            .unwrap_or_else(|| format!("call_{}", delta.index)),
                                        ..PendingCall::default()
                                    });
                                }
                                if let (Some(call), Some(function)) =
                                    (pending.as_mut(), delta.function.as_ref())
                                {
                                    if let Some(name) = &function.name {
                                        call.name.push_str(name);
                                    }
                                    if let Some(args) = &function.arguments {
                                        call.arguments.push_str(args);
                                    }
                                }
                            }
                        }

                        if choice.finish_reason.is_some() {
                            if let Some(done) = pending.take().and_then(PendingCall::finish) {
                                yield StreamEvent::ToolCall(done);
                            }
                        }
                    }
                }
            }

            if let Some(call) = pending.take().and_then(PendingCall::finish) {
                yield StreamEvent::ToolCall(call);
            }
            yield StreamEvent::Done;
        };

        Ok(Box::pin(stream))
    }

    async fn complete(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let response = self.post(&request, false).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .first()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|tc| {
                let arguments = serde_json::from_str(&tc.function.arguments).map_err(|e| {
                    LlmError::InvalidResponse(format!("invalid tool arguments JSON: {e}"))
                })?;
                Ok(ToolCall {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    arguments,
                })
            })
            .collect::<LlmResult<_>>()?;

        let (message, stop_reason) = if tool_calls.is_empty() {
            let text = choice.message.content.clone().unwrap_or_default();
            let reason = match choice.finish_reason.as_deref() {
                Some("length") => StopReason::MaxTokens,
                _ => StopReason::EndTurn,
            };
            (ChatMessage::assistant(text), reason)
        } else {
            (
                ChatMessage::assistant_with_tools(tool_calls.clone()),
                StopReason::ToolUse,
            )
        };

        let usage = parsed.usage.map_or(Usage::default(), |u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(ChatResponse {
            message,
            tool_calls,
            stop_reason,
            usage,
        })
    }
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("backend", &self.backend_name)
            .field("base_url", &self.base_url)
            .finish()
    }
}

// Wire types.

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    delta: SseDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<SseToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct SseToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<SseFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct SseFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
