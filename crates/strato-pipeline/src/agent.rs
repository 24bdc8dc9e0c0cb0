//! The agent tool loop.

use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use strato_core::{ClientEvent, StatusKind};
use strato_llm::{
    ChatClient, ChatMessage, ChatRequest, GenerationOptions, StreamEvent, ToolCall,
    ToolCallResult, ToolDefinition, Usage, estimate_tokens,
};
use strato_tools::{ExecutionContext, ToolRegistry};

/// Upper bound on model→tool→model rounds in one turn.
const MAX_TOOL_ROUNDS: usize = 10;

/// Final result of an agent turn.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// Final response text.
    pub response: String,
    /// Total tokens across all rounds.
    pub tokens_used: u64,
}

/// One round of model output, assembled from the stream.
struct RoundResult {
    text: String,
    tool_calls: Vec<ToolCall>,
    usage: Usage,
}

/// Drives the streaming model ↔ tool loop for one turn.
///
/// Tokens are forwarded to the session hub as they arrive; tool calls are
/// dispatched through the registry and their results fed back to the model.
/// The loop ends when the model produces a final message without tool calls,
/// the round limit is hit, the turn is cancelled, or the backend fails past
/// the single non-streaming retry.
pub struct AgentLoop {
    tools: Arc<ToolRegistry>,
}

impl AgentLoop {
    /// Create a loop over the tool registry.
    #[must_use]
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Run one turn.
    ///
    /// `messages` carries the conversation history with the enriched user
    /// message last; `supports_tools` gates whether the tool set is offered.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Cancelled`] when the token fires mid-turn.
    /// - [`PipelineError::Backend`] when streaming and the non-streaming
    ///   retry both fail.
    pub async fn run_turn(
        &self,
        client: Arc<dyn ChatClient>,
        ctx: &ExecutionContext,
        model: &str,
        system_prompt: &str,
        mut messages: Vec<ChatMessage>,
        options: GenerationOptions,
        supports_tools: bool,
    ) -> PipelineResult<AgentOutcome> {
        let tool_defs: Vec<ToolDefinition> = if supports_tools {
            self.tools
                .definitions()
                .into_iter()
                .map(|(name, description, schema)| ToolDefinition::new(name, description, schema))
                .collect()
        } else {
            Vec::new()
        };

        let mut total_usage = Usage::default();
        let mut final_text = String::new();

        for round in 0..MAX_TOOL_ROUNDS {
            if ctx.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let request = ChatRequest::new(model, messages.clone())
                .with_system(system_prompt)
                .with_tools(tool_defs.clone())
                .with_options(options.clone());

            let result = self
                .run_round(Arc::clone(&client), ctx, request)
                .await?;

            total_usage.input_tokens = total_usage.input_tokens.saturating_add(result.usage.input_tokens);
            total_usage.output_tokens =
                total_usage.output_tokens.saturating_add(result.usage.output_tokens);

            if result.tool_calls.is_empty() {
                final_text = result.text;
                break;
            }

            debug!(round, calls = result.tool_calls.len(), "dispatching tool calls");
            messages.push(ChatMessage::assistant_with_tools(result.tool_calls.clone()));

            for call in result.tool_calls {
                if ctx.cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }

                if let Some(bot_id) = &ctx.bot_id {
                    ctx.hub
                        .send_to_client(
                            bot_id,
                            &ClientEvent::ToolCall {
                                request_id: ctx.request_id.clone(),
                                name: call.name.clone(),
                                args: call.arguments.clone(),
                            },
                        )
                        .await;
                }

                let output = self.tools.dispatch(&call.name, call.arguments.clone(), ctx).await;

                if let Some(bot_id) = &ctx.bot_id {
                    ctx.hub
                        .send_to_client(
                            bot_id,
                            &ClientEvent::ToolResult {
                                request_id: ctx.request_id.clone(),
                                name: call.name.clone(),
                                success: output.success,
                            },
                        )
                        .await;
                }

                let result_message = if output.success {
                    ToolCallResult::success(&call.id, output.for_model())
                } else {
                    ToolCallResult::error(&call.id, output.for_model())
                };
                messages.push(ChatMessage::tool_result(result_message));
            }
        }

        // Streams can end without a usage record; approximate so budgets
        // still move.
        if total_usage.output_tokens == 0 && !final_text.is_empty() {
            total_usage.output_tokens = estimate_tokens(&final_text);
        }

        info!(
            request_id = %ctx.request_id,
            tokens = total_usage.total(),
            chars = final_text.len(),
            "agent turn finished"
        );

        Ok(AgentOutcome {
            response: final_text,
            tokens_used: total_usage.total(),
        })
    }

    /// One model round: stream, forwarding tokens; on transient failure,
    /// announce and retry once without streaming.
    async fn run_round(
        &self,
        client: Arc<dyn ChatClient>,
        ctx: &ExecutionContext,
        request: ChatRequest,
    ) -> PipelineResult<RoundResult> {
        match self.stream_round(Arc::clone(&client), ctx, request.clone()).await {
            Ok(result) => Ok(result),
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(error = %e, "streaming failed, retrying non-streaming");
                if let Some(bot_id) = &ctx.bot_id {
                    ctx.hub
                        .send_status_indicator(
                            bot_id,
                            &ctx.channel_id,
                            &ctx.message_id,
                            StatusKind::Retrying,
                            &ctx.request_id,
                        )
                        .await;
                }

                let response = client
                    .complete(request)
                    .await
                    .map_err(|err| PipelineError::Backend(err.to_string()))?;
                Ok(RoundResult {
                    text: response.text().to_string(),
                    tool_calls: response.tool_calls,
                    usage: response.usage,
                })
            },
        }
    }

    async fn stream_round(
        &self,
        client: Arc<dyn ChatClient>,
        ctx: &ExecutionContext,
        request: ChatRequest,
    ) -> PipelineResult<RoundResult> {
        let mut stream = client
            .stream(request)
            .await
            .map_err(|e| PipelineError::Backend(e.to_string()))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = Usage::default();

        loop {
            let event = tokio::select! {
                () = ctx.cancel.cancelled() => {
                    // Abort at the chunk boundary; drain any ask_user waiter.
                    ctx.hub.abort_questions(&ctx.request_id);
                    return Err(PipelineError::Cancelled);
                },
                event = stream.next() => event,
            };

            let Some(event) = event else { break };
            let event = event.map_err(|e| PipelineError::Backend(e.to_string()))?;

            match event {
                StreamEvent::TextDelta(delta) => {
                    if let Some(bot_id) = &ctx.bot_id {
                        ctx.hub
                            .send_to_client(
                                bot_id,
                                &ClientEvent::Token {
                                    request_id: ctx.request_id.clone(),
                                    text: delta.clone(),
                                },
                            )
                            .await;
                    }
                    text.push_str(&delta);
                },
                StreamEvent::ThinkingDelta(_) => {
                    // Thinking stays server-side; clients get tokens only.
                },
                StreamEvent::ToolCall(call) => tool_calls.push(call),
                StreamEvent::Usage(u) => usage = u,
                StreamEvent::Done => break,
            }
        }

        Ok(RoundResult {
            text,
            tool_calls,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use strato_llm::{ChatResponse, LlmError, LlmResult, StopReason, StreamBox};
    use strato_tools::{Tool, ToolOutput};
    use tokio_util::sync::CancellationToken;

    /// Scripted client: each call pops the next response; a text response
    /// streams as per-word deltas.
    struct Scripted {
        responses: Mutex<Vec<ScriptedResponse>>,
        fail_stream_once: Mutex<bool>,
    }

    enum ScriptedResponse {
        Text(&'static str),
        ToolCall(&'static str, serde_json::Value),
    }

    impl Scripted {
        fn new(responses: Vec<ScriptedResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                fail_stream_once: Mutex::new(false),
            })
        }

        fn pop(&self) -> Option<ScriptedResponse> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                None
            } else {
                Some(responses.remove(0))
            }
        }
    }

    #[async_trait]
    impl ChatClient for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream(&self, _request: ChatRequest) -> LlmResult<StreamBox> {
            let should_fail = {
                let mut flag = self.fail_stream_once.lock().unwrap();
                std::mem::take(&mut *flag)
            };
            if should_fail {
                return Err(LlmError::Streaming("connection reset".to_string()));
            }
            let Some(next) = self.pop() else {
                return Err(LlmError::RequestFailed("script exhausted".to_string()));
            };
            let events: Vec<LlmResult<StreamEvent>> = match next {
                ScriptedResponse::Text(text) => {
                    let mut events: Vec<LlmResult<StreamEvent>> = text
                        .split_inclusive(' ')
                        .map(|w| Ok(StreamEvent::TextDelta(w.to_string())))
                        .collect();
                    events.push(Ok(StreamEvent::Usage(Usage {
                        input_tokens: 10,
                        output_tokens: 5,
                    })));
                    events.push(Ok(StreamEvent::Done));
                    events
                },
                ScriptedResponse::ToolCall(name, args) => vec![
                    Ok(StreamEvent::ToolCall(
                        ToolCall::new("call_1", name).with_arguments(args),
                    )),
                    Ok(StreamEvent::Done),
                ],
            };
            Ok(Box::pin(futures::stream::iter(events)))
        }

        async fn complete(&self, _request: ChatRequest) -> LlmResult<ChatResponse> {
            match self.pop() {
                Some(ScriptedResponse::Text(text)) => Ok(ChatResponse {
                    message: ChatMessage::assistant(text),
                    tool_calls: Vec::new(),
                    stop_reason: StopReason::EndTurn,
                    usage: Usage {
                        input_tokens: 10,
                        output_tokens: 5,
                    },
                }),
                _ => Err(LlmError::RequestFailed("script exhausted".to_string())),
            }
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the input"
        }

        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, args: serde_json::Value, _ctx: &ExecutionContext) -> ToolOutput {
            ToolOutput::ok(args["text"].as_str().unwrap_or("").to_string())
        }
    }

    fn agent() -> AgentLoop {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        AgentLoop::new(Arc::new(registry))
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            request_id: strato_core::RequestId::new(),
            user_id: strato_core::UserId::new("u"),
            thread_id: strato_core::ThreadId::new("t"),
            channel_id: "chan".to_string(),
            message_id: "msg".to_string(),
            bot_id: None,
            interface: "cli".to_string(),
            cancel: CancellationToken::new(),
            hub: Arc::new(strato_hub::SessionHub::new()),
            file_refs: Vec::new(),
            artifacts_created: tokio::sync::Mutex::new(Vec::new()),
            artifact_dir: std::env::temp_dir(),
            workspace_dir: std::env::temp_dir(),
            endpoints: strato_tools::ServiceEndpoints::default(),
        }
    }

    #[tokio::test]
    async fn test_plain_text_turn() {
        let client = Scripted::new(vec![ScriptedResponse::Text("The answer is 4.")]);
        let outcome = agent()
            .run_turn(
                client,
                &ctx(),
                "gpt-oss:20b",
                "be helpful",
                vec![ChatMessage::user("2+2?")],
                GenerationOptions::default(),
                true,
            )
            .await
            .unwrap();
        assert_eq!(outcome.response, "The answer is 4.");
        assert_eq!(outcome.tokens_used, 15);
    }

    #[tokio::test]
    async fn test_tool_round_then_final() {
        let client = Scripted::new(vec![
            ScriptedResponse::ToolCall("echo", json!({"text": "pong"})),
            ScriptedResponse::Text("The tool said pong."),
        ]);
        let outcome = agent()
            .run_turn(
                client,
                &ctx(),
                "gpt-oss:20b",
                "",
                vec![ChatMessage::user("use the tool")],
                GenerationOptions::default(),
                true,
            )
            .await
            .unwrap();
        assert_eq!(outcome.response, "The tool said pong.");
    }

    #[tokio::test]
    async fn test_unknown_tool_fed_back_as_error() {
        let client = Scripted::new(vec![
            ScriptedResponse::ToolCall("missing_tool", json!({})),
            ScriptedResponse::Text("I could not use that tool."),
        ]);
        let outcome = agent()
            .run_turn(
                client,
                &ctx(),
                "m",
                "",
                vec![ChatMessage::user("go")],
                GenerationOptions::default(),
                true,
            )
            .await
            .unwrap();
        assert_eq!(outcome.response, "I could not use that tool.");
    }

    #[tokio::test]
    async fn test_streaming_failure_retries_non_streaming() {
        let client = Scripted::new(vec![ScriptedResponse::Text("recovered")]);
        *client.fail_stream_once.lock().unwrap() = true;

        let outcome = agent()
            .run_turn(
                client,
                &ctx(),
                "m",
                "",
                vec![ChatMessage::user("hi")],
                GenerationOptions::default(),
                true,
            )
            .await
            .unwrap();
        assert_eq!(outcome.response, "recovered");
    }

    #[tokio::test]
    async fn test_cancellation_before_round() {
        let client = Scripted::new(vec![ScriptedResponse::Text("never")]);
        let ctx = ctx();
        ctx.cancel.cancel();

        let err = agent()
            .run_turn(
                client,
                &ctx,
                "m",
                "",
                vec![ChatMessage::user("hi")],
                GenerationOptions::default(),
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
