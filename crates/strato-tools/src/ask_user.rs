//! The `ask_user` tool: suspend the agent and wait for a human answer.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{info, warn};

use crate::context::ExecutionContext;
use crate::registry::{Tool, ToolOutput};
use strato_core::ClientEvent;

/// Default wait for an answer.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Asks the user a question over the session hub and parks on the
/// per-request answer channel.
///
/// Timeout and cancellation both resolve to failed outputs; the agent
/// decides whether to continue without the answer.
pub struct AskUserTool;

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &'static str {
        "ask_user"
    }

    fn description(&self) -> &'static str {
        "Ask the user a question and wait for their response. Use this when you need \
clarification on ambiguous requests, user preferences or choices, confirmation before \
taking an action, or additional information to complete a task."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask. Be clear and specific."
                },
                "options": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional suggested responses; free text is always accepted."
                },
                "timeout": {
                    "type": "integer",
                    "description": "Seconds to wait for a response (default 300)."
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(question) = args.get("question").and_then(Value::as_str) else {
            return ToolOutput::err("question is required");
        };
        let options: Option<Vec<String>> = args.get("options").and_then(Value::as_array).map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        });
        let timeout_secs = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let Some(bot_id) = ctx.bot_id.clone() else {
            return ToolOutput::err("no connected client to ask");
        };

        // Register the waiter before sending so an instant answer can't race
        // past us.
        let answer = ctx.hub.register_question(&ctx.request_id);

        let event = ClientEvent::UserQuestion {
            request_id: ctx.request_id.clone(),
            question: question.to_string(),
            options,
            timeout_secs,
        };
        if !ctx.hub.send_to_client(&bot_id, &event).await {
            ctx.hub.abort_questions(&ctx.request_id);
            return ToolOutput::err("client disconnected before the question was sent");
        }

        info!(request_id = %ctx.request_id, "waiting for user answer");

        tokio::select! {
            () = ctx.cancel.cancelled() => {
                ctx.hub.abort_questions(&ctx.request_id);
                ToolOutput::err("cancelled while waiting for user response")
            },
            result = tokio::time::timeout(Duration::from_secs(timeout_secs), answer) => {
                match result {
                    Ok(Ok(text)) => {
                        info!(request_id = %ctx.request_id, "user answered");
                        ToolOutput::ok(text)
                    },
                    Ok(Err(_)) => ToolOutput::err("question was aborted"),
                    Err(_) => {
                        warn!(request_id = %ctx.request_id, timeout_secs, "ask_user timed out");
                        ctx.hub.abort_questions(&ctx.request_id);
                        ToolOutput::err(format!(
                            "User did not respond within {timeout_secs} seconds"
                        ))
                    },
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use std::sync::Arc;
    use strato_core::ClientId;
    use strato_hub::ConnectionSink;

    struct AcceptSink;

    #[async_trait]
    impl ConnectionSink for AcceptSink {
        async fn send(&self, _event: &ClientEvent) -> bool {
            true
        }
    }

    fn connected_context() -> ExecutionContext {
        let mut ctx = test_context();
        let bot = ClientId::new("bot");
        ctx.hub.register(bot.clone(), Arc::new(AcceptSink));
        ctx.bot_id = Some(bot);
        ctx
    }

    #[tokio::test]
    async fn test_answer_roundtrip() {
        let ctx = connected_context();
        let hub = Arc::clone(&ctx.hub);
        let request_id = ctx.request_id.clone();

        let answering = tokio::spawn(async move {
            // Let the tool register its waiter first.
            tokio::time::sleep(Duration::from_millis(20)).await;
            hub.answer_question(&request_id, "blue".to_string())
        });

        let out = AskUserTool
            .execute(json!({"question": "Favorite color?"}), &ctx)
            .await;
        assert!(out.success);
        assert_eq!(out.content, "blue");
        assert!(answering.await.unwrap());
    }

    #[tokio::test]
    async fn test_timeout_yields_failure() {
        let ctx = connected_context();
        let out = AskUserTool
            .execute(json!({"question": "Anyone there?", "timeout": 0}), &ctx)
            .await;
        assert!(!out.success);
        assert!(out.error.unwrap().contains("did not respond"));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_wait() {
        let ctx = connected_context();
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let out = AskUserTool
            .execute(json!({"question": "Still there?"}), &ctx)
            .await;
        assert!(!out.success);
        assert!(out.error.unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_missing_question() {
        let ctx = connected_context();
        let out = AskUserTool.execute(json!({}), &ctx).await;
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_no_client() {
        let ctx = test_context();
        let out = AskUserTool.execute(json!({"question": "Hi?"}), &ctx).await;
        assert!(!out.success);
        assert!(out.error.unwrap().contains("no connected client"));
    }
}
