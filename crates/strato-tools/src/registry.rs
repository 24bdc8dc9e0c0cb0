//! The [`Tool`] trait and registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::ExecutionContext;

/// Maximum tool output fed back to the model.
const MAX_OUTPUT_CHARS: usize = 30_000;

/// Result of a tool invocation. Failure is data, not an error: the agent
/// decides whether to retry or work around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Tool output (or empty on failure).
    pub content: String,
    /// Whether the tool succeeded.
    pub success: bool,
    /// Failure detail when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutput {
    /// Successful output, truncated to the model-facing cap.
    #[must_use]
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: truncate(content.into()),
            success: true,
            error: None,
        }
    }

    /// Failed output.
    #[must_use]
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            success: false,
            error: Some(error.into()),
        }
    }

    /// Text to feed back to the model.
    #[must_use]
    pub fn for_model(&self) -> String {
        if self.success {
            self.content.clone()
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("tool failed")
            )
        }
    }
}

fn truncate(mut output: String) -> String {
    if output.len() > MAX_OUTPUT_CHARS {
        let mut cut = MAX_OUTPUT_CHARS;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        output.truncate(cut);
        output.push_str("\n\n... (output truncated)");
    }
    output
}

/// An agent tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to the model.
    fn name(&self) -> &'static str;

    /// Description for the model.
    fn description(&self) -> &'static str;

    /// JSON schema for the arguments object.
    fn input_schema(&self) -> Value;

    /// Execute. Must not panic; encode failure in the output.
    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput;
}

/// Name-indexed tool collection, built once at startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Names of all registered tools, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Dispatch a call by name; unknown tools produce a failed output, not
    /// an error.
    pub async fn dispatch(&self, name: &str, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "unknown tool requested");
            return ToolOutput::err(format!("unknown tool: {name}"));
        };
        if ctx.cancel.is_cancelled() {
            return ToolOutput::err("cancelled");
        }
        debug!(tool = name, request_id = %ctx.request_id, "dispatching tool");
        tool.execute(args, ctx).await
    }

    /// Export `(name, description, schema)` triples for the model.
    #[must_use]
    pub fn definitions(&self) -> Vec<(String, String, Value)> {
        let mut defs: Vec<(String, String, Value)> = self
            .tools
            .values()
            .map(|t| {
                (
                    t.name().to_string(),
                    t.description().to_string(),
                    t.input_schema(),
                )
            })
            .collect();
        defs.sort_by(|a, b| a.0.cmp(&b.0));
        defs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn description(&self) -> &'static str {
            "Uppercase text"
        }

        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, args: Value, _ctx: &ExecutionContext) -> ToolOutput {
            match args.get("text").and_then(Value::as_str) {
                Some(text) => ToolOutput::ok(text.to_uppercase()),
                None => ToolOutput::err("text is required"),
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(UpperTool));
        let ctx = test_context();

        let out = registry
            .dispatch("upper", serde_json::json!({"text": "hi"}), &ctx)
            .await;
        assert!(out.success);
        assert_eq!(out.content, "HI");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failed_output() {
        let registry = ToolRegistry::new();
        let ctx = test_context();
        let out = registry.dispatch("nope", Value::Null, &ctx).await;
        assert!(!out.success);
        assert!(out.for_model().contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_cancelled_context_refuses_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(UpperTool));
        let ctx = test_context();
        ctx.cancel.cancel();

        let out = registry
            .dispatch("upper", serde_json::json!({"text": "hi"}), &ctx)
            .await;
        assert!(!out.success);
    }

    #[test]
    fn test_truncation() {
        let out = ToolOutput::ok("x".repeat(50_000));
        assert!(out.content.len() < 50_000);
        assert!(out.content.ends_with("(output truncated)"));
    }

    #[test]
    fn test_for_model_error_shape() {
        let out = ToolOutput::err("boom");
        assert_eq!(out.for_model(), "Error: boom");
    }
}
