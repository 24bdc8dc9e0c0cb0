//! Shell and code execution tools.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::context::ExecutionContext;
use crate::registry::{Tool, ToolOutput};

/// Default command timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

async fn run_with_timeout(
    mut command: tokio::process::Command,
    stdin_data: Option<&str>,
    timeout_secs: u64,
    cancel: &tokio_util::sync::CancellationToken,
) -> ToolOutput {
    command
        .stdin(if stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return ToolOutput::err(format!("could not spawn: {e}")),
    };

    if let (Some(data), Some(mut stdin)) = (stdin_data, child.stdin.take()) {
        let data = data.to_string();
        tokio::spawn(async move {
            let _ = stdin.write_all(data.as_bytes()).await;
        });
    }

    let waited = tokio::select! {
        () = cancel.cancelled() => {
            return ToolOutput::err("cancelled");
        },
        waited = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        ) => waited,
    };

    match waited {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut combined = stdout.into_owned();
            if !stderr.is_empty() {
                combined.push_str("\n--- stderr ---\n");
                combined.push_str(&stderr);
            }
            if output.status.success() {
                ToolOutput::ok(combined)
            } else {
                ToolOutput {
                    content: combined,
                    success: false,
                    error: Some(format!(
                        "exit code {}",
                        output.status.code().unwrap_or(-1)
                    )),
                }
            }
        },
        Ok(Err(e)) => ToolOutput::err(format!("wait failed: {e}")),
        Err(_) => ToolOutput::err(format!("timed out after {timeout_secs}s")),
    }
}

/// Run a shell command in the turn workspace.
pub struct ExecuteCommandTool;

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &'static str {
        "execute_command"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command in the workspace and return its output."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to run"},
                "timeout": {"type": "integer", "description": "Seconds before the command is killed (default 60)"}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(command_line) = args.get("command").and_then(Value::as_str) else {
            return ToolOutput::err("command is required");
        };
        let timeout_secs = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        info!(request_id = %ctx.request_id, command = command_line, "executing command");

        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg(command_line).current_dir(&ctx.workspace_dir);
        run_with_timeout(command, None, timeout_secs, &ctx.cancel).await
    }
}

/// Run a Python snippet.
pub struct RunCodeTool;

#[async_trait]
impl Tool for RunCodeTool {
    fn name(&self) -> &'static str {
        "run_code"
    }

    fn description(&self) -> &'static str {
        "Run a Python code snippet and return its output. Use print() for results."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "Python source to execute"},
                "timeout": {"type": "integer", "description": "Seconds before execution is killed (default 60)"}
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(code) = args.get("code").and_then(Value::as_str) else {
            return ToolOutput::err("code is required");
        };
        let timeout_secs = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        info!(request_id = %ctx.request_id, bytes = code.len(), "running code");

        let mut command = tokio::process::Command::new("python3");
        command.arg("-").current_dir(&ctx.workspace_dir);
        run_with_timeout(command, Some(code), timeout_secs, &ctx.cancel).await
    }
}
