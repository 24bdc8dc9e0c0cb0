//! Native Ollama chat client.
//!
//! Speaks `/api/chat` with NDJSON streaming, `/api/generate` for load/unload
//! control, and carries `keep_alive` and thinking options through. Tool calls
//! arrive whole in a single chunk rather than as argument deltas.

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::client::{ChatClient, ChatRequest, GenerationOptions, StreamBox, ThinkingDirective};
use crate::error::{LlmError, LlmResult};
use crate::types::{
    ChatMessage, ChatResponse, MessageContent, MessageRole, StopReason, StreamEvent, ToolCall,
    Usage,
};

/// Timeout for load/unload control calls.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for a single Ollama server.
pub struct OllamaClient {
    client: Client,
    host: String,
}

impl OllamaClient {
    /// Create a client for `host` (e.g. `http://localhost:11434`).
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
        }
    }

    /// The configured host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Ask Ollama to load a model into memory without generating.
    ///
    /// An empty-prompt `/api/generate` call pulls the weights in and pins
    /// them for `keep_alive`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] if the server rejects the load.
    pub async fn load_model(&self, model: &str, keep_alive: &str) -> LlmResult<()> {
        let body = json!({
            "model": model,
            "prompt": "",
            "stream": false,
            "keep_alive": keep_alive,
        });
        self.generate_control(model, body, "load").await
    }

    /// Ask Ollama to unload a model immediately (`keep_alive: 0`).
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] if the server rejects the unload.
    pub async fn unload_model(&self, model: &str) -> LlmResult<()> {
        let body = json!({
            "model": model,
            "prompt": "",
            "stream": false,
            "keep_alive": 0,
        });
        self.generate_control(model, body, "unload").await
    }

    /// Models the server currently has loaded, from `/api/ps`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] if the server is unreachable.
    pub async fn loaded_models(&self) -> LlmResult<Vec<String>> {
        let url = format!("{}/api/ps", self.host);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(LlmError::HttpStatus {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let parsed: PsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate_control(&self, model: &str, body: Value, action: &str) -> LlmResult<()> {
        let url = format!("{}/api/generate", self.host);
        debug!(%model, action, "Ollama control call");
        let response = self
            .client
            .post(&url)
            .timeout(CONTROL_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            error!(%model, action, status, "Ollama control call failed");
            return Err(LlmError::HttpStatus { status, body: text });
        }
        Ok(())
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
            "stream": stream,
            "options": {"temperature": request.options.temperature},
        });

        if let Some(max) = request.options.max_tokens {
            body["options"]["num_predict"] = json!(max);
        }
        if let Some(ref keep_alive) = request.options.keep_alive {
            body["keep_alive"] = json!(keep_alive);
        }
        match &request.options.thinking {
            ThinkingDirective::ModelDefault => {},
            ThinkingDirective::Enabled(on) => body["think"] = json!(on),
            ThinkingDirective::Level(level) => body["think"] = json!(level),
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

    async fn post_chat(&self, request: &ChatRequest, stream: bool) -> LlmResult<reqwest::Response> {
        let url = format!("{}/api/chat", self.host);
        let body = self.build_body(request, stream);

        debug!(model = %request.model, stream, "Ollama chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            error!(model = %request.model, status, body = %text, "Ollama chat error");
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
            json!({"role": role, "content": text, "images": images_base64})
        },
        MessageContent::ToolCalls(calls) => {
            let tool_calls: Vec<Value> = calls
                .iter()
                .map(|c| {
                    json!({
                        "function": {"name": c.name, "arguments": c.arguments}
                    })
                })
                .collect();
            json!({"role": "assistant", "content": "", "tool_calls": tool_calls})
        },
        MessageContent::ToolResult(result) => {
            json!({"role": "tool", "content": result.content})
        },
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }

    async fn stream(&self, request: ChatRequest) -> LlmResult<StreamBox> {
        let response = self.post_chat(&request, true).await?;

        let stream = try_stream! {
            use futures::StreamExt;

            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            let mut call_index: usize = 0;

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| LlmError::Streaming(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // NDJSON: one JSON object per line.
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    if line.is_empty() {
                        continue;
                    }

                    let parsed: OllamaChunk = match serde_json::from_str(&line) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "skipping unparseable Ollama chunk");
                            continue;
                        },
                    };

                    if let Some(msg) = &parsed.message {
                        if let Some(thinking) = &msg.thinking {
                            if !thinking.is_empty() {
                                yield StreamEvent::ThinkingDelta(thinking.clone());
                            }
                        }
                        if !msg.content.is_empty() {
                            yield StreamEvent::TextDelta(msg.content.clone());
                        }
                        if let Some(calls) = &msg.tool_calls {
                            for call in calls {
                                call_index = call_index.saturating_add(1);
                                yield StreamEvent::ToolCall(ToolCall {
                                    id: format!("call_{call_index}"),
                                    name: call.function.name.clone(),
                                    arguments: call.function.arguments.clone(),
                                });
                            }
                        }
                    }

                    if parsed.done {
                        yield StreamEvent::Usage(Usage {
                            input_tokens: parsed.prompt_eval_count.unwrap_or(0),
                            output_tokens: parsed.eval_count.unwrap_or(0),
                        });
                        yield StreamEvent::Done;
                        return;
                    }
                }
            }

            yield StreamEvent::Done;
        };

        Ok(Box::pin(stream))
    }

    async fn complete(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let response = self.post_chat(&request, false).await?;
        let parsed: OllamaChunk = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let message = parsed
            .message
            .ok_or_else(|| LlmError::InvalidResponse("missing message in response".to_string()))?;

        let tool_calls: Vec<ToolCall> = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, c)| ToolCall {
                id: format!("call_{i}"),
                name: c.function.name,
                arguments: c.function.arguments,
            })
            .collect();

        let (chat_message, stop_reason) = if tool_calls.is_empty() {
            (ChatMessage::assistant(message.content), StopReason::EndTurn)
        } else {
            (
                ChatMessage::assistant_with_tools(tool_calls.clone()),
                StopReason::ToolUse,
            )
        };

        Ok(ChatResponse {
            message: chat_message,
            tool_calls,
            stop_reason,
            usage: Usage {
                input_tokens: parsed.prompt_eval_count.unwrap_or(0),
                output_tokens: parsed.eval_count.unwrap_or(0),
            },
        })
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient").field("host", &self.host).finish()
    }
}

// Ollama wire types.

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    thinking: Option<String>,
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct PsResponse {
    #[serde(default)]
    models: Vec<PsModel>,
}

#[derive(Debug, Deserialize)]
struct PsModel {
    name: String,
}
