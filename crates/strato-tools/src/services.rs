//! Tools backed by external collaborator services.
//!
//! The knowledge store, web search, and image generator are separate
//! services named only by their HTTP contract; these tools are thin clients
//! that translate failures into failed outputs.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::registry::{Tool, ToolOutput};

/// Shared request timeout for service calls.
const SERVICE_TIMEOUT: Duration = Duration::from_secs(30);
/// Longer timeout for image generation.
const IMAGE_TIMEOUT: Duration = Duration::from_secs(180);
/// Cap on fetched page content fed back to the model.
const FETCH_CHAR_LIMIT: usize = 20_000;

fn http() -> reqwest::Client {
    reqwest::Client::new()
}

async fn get_json(url: &str, timeout: Duration) -> Result<Value, String> {
    let response = http()
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status().as_u16()));
    }
    response.json().await.map_err(|e| e.to_string())
}

async fn post_json(url: &str, body: &Value, timeout: Duration) -> Result<Value, String> {
    let response = http()
        .post(url)
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status().as_u16()));
    }
    response.json().await.map_err(|e| e.to_string())
}

/// Search the user's knowledge store.
pub struct BrainSearchTool;

#[async_trait]
impl Tool for BrainSearchTool {
    fn name(&self) -> &'static str {
        "brain_search"
    }

    fn description(&self) -> &'static str {
        "Search the user's personal knowledge store for notes matching a query."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "limit": {"type": "integer", "description": "Max results (default 5)"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return ToolOutput::err("query is required");
        };
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(5);
        let url = format!("{}/search", ctx.endpoints.brain);
        let body = json!({"query": query, "limit": limit, "user_id": ctx.user_id.as_str()});
        match post_json(&url, &body, SERVICE_TIMEOUT).await {
            Ok(value) => ToolOutput::ok(format_results(&value)),
            Err(e) => ToolOutput::err(format!("brain search failed: {e}")),
        }
    }
}

/// Fetch a note from the knowledge store by path.
pub struct BrainFetchTool;

#[async_trait]
impl Tool for BrainFetchTool {
    fn name(&self) -> &'static str {
        "brain_fetch"
    }

    fn description(&self) -> &'static str {
        "Fetch the full content of a note from the user's knowledge store by its path."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Note path from a brain_search result"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(path) = args.get("path").and_then(Value::as_str) else {
            return ToolOutput::err("path is required");
        };
        let url = format!(
            "{}/notes?path={}&user_id={}",
            ctx.endpoints.brain,
            urlencode(path),
            urlencode(ctx.user_id.as_str())
        );
        match get_json(&url, SERVICE_TIMEOUT).await {
            Ok(value) => {
                let content = value
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                ToolOutput::ok(content.to_string())
            },
            Err(e) => ToolOutput::err(format!("brain fetch failed: {e}")),
        }
    }
}

/// Web search via the search service's JSON API.
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn description(&self) -> &'static str {
        "Search the web. Returns titles, URLs, and snippets for the top results."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "limit": {"type": "integer", "description": "Max results (default 5)"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return ToolOutput::err("query is required");
        };
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(5) as usize;
        let url = format!(
            "{}/search?q={}&format=json",
            ctx.endpoints.search,
            urlencode(query)
        );
        match get_json(&url, SERVICE_TIMEOUT).await {
            Ok(value) => {
                let empty = Vec::new();
                let results = value
                    .get("results")
                    .and_then(Value::as_array)
                    .unwrap_or(&empty);
                if results.is_empty() {
                    return ToolOutput::ok("No results found.".to_string());
                }
                let formatted: Vec<String> = results
                    .iter()
                    .take(limit)
                    .map(|r| {
                        format!(
                            "{}\n{}\n{}",
                            r.get("title").and_then(Value::as_str).unwrap_or("(untitled)"),
                            r.get("url").and_then(Value::as_str).unwrap_or(""),
                            r.get("content").and_then(Value::as_str).unwrap_or("")
                        )
                    })
                    .collect();
                ToolOutput::ok(formatted.join("\n\n"))
            },
            Err(e) => ToolOutput::err(format!("web search failed: {e}")),
        }
    }
}

/// Fetch a web page as text.
pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &'static str {
        "web_fetch"
    }

    fn description(&self) -> &'static str {
        "Fetch a web page and return its text content."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Page URL"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ExecutionContext) -> ToolOutput {
        let Some(url) = args.get("url").and_then(Value::as_str) else {
            return ToolOutput::err("url is required");
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolOutput::err("only http(s) URLs are supported");
        }

        match http().get(url).timeout(SERVICE_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(mut text) => {
                    if text.len() > FETCH_CHAR_LIMIT {
                        let mut cut = FETCH_CHAR_LIMIT;
                        while !text.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        text.truncate(cut);
                        text.push_str("\n... (truncated)");
                    }
                    ToolOutput::ok(text)
                },
                Err(e) => ToolOutput::err(format!("could not read body: {e}")),
            },
            Ok(response) => ToolOutput::err(format!("HTTP {}", response.status().as_u16())),
            Err(e) => ToolOutput::err(format!("fetch failed: {e}")),
        }
    }
}

/// Save a note to the knowledge store.
pub struct RememberTool;

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &'static str {
        "remember"
    }

    fn description(&self) -> &'static str {
        "Save a note to the user's knowledge store for later recall."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "What to remember"},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(content) = args.get("content").and_then(Value::as_str) else {
            return ToolOutput::err("content is required");
        };
        let url = format!("{}/notes", ctx.endpoints.brain);
        let body = json!({
            "content": content,
            "tags": args.get("tags").cloned().unwrap_or(Value::Null),
            "user_id": ctx.user_id.as_str(),
        });
        match post_json(&url, &body, SERVICE_TIMEOUT).await {
            Ok(_) => ToolOutput::ok("Saved."),
            Err(e) => ToolOutput::err(format!("could not save note: {e}")),
        }
    }
}

/// Recall previously saved notes.
pub struct RecallTool;

#[async_trait]
impl Tool for RecallTool {
    fn name(&self) -> &'static str {
        "recall"
    }

    fn description(&self) -> &'static str {
        "Recall previously remembered notes matching a query."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to recall"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return ToolOutput::err("query is required");
        };
        let url = format!("{}/search", ctx.endpoints.brain);
        let body = json!({"query": query, "limit": 5, "user_id": ctx.user_id.as_str(), "kind": "memory"});
        match post_json(&url, &body, SERVICE_TIMEOUT).await {
            Ok(value) => ToolOutput::ok(format_results(&value)),
            Err(e) => ToolOutput::err(format!("recall failed: {e}")),
        }
    }
}

/// Generate an image via the image service.
pub struct GenerateImageTool;

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &'static str {
        "generate_image"
    }

    fn description(&self) -> &'static str {
        "Generate an image from a text prompt. Returns the path of the saved image."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string", "description": "Image description"}
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(prompt) = args.get("prompt").and_then(Value::as_str) else {
            return ToolOutput::err("prompt is required");
        };
        let url = format!("{}/generate", ctx.endpoints.image);
        let body = json!({"prompt": prompt});
        match post_json(&url, &body, IMAGE_TIMEOUT).await {
            Ok(value) => match value.get("path").and_then(Value::as_str) {
                Some(path) => ToolOutput::ok(format!("Image generated: {path}")),
                None => ToolOutput::err("image service returned no path"),
            },
            Err(e) => ToolOutput::err(format!("image generation failed: {e}")),
        }
    }
}

/// Render a `{results: [{title/path, snippet}]}` payload for the model.
fn format_results(value: &Value) -> String {
    let empty = Vec::new();
    let results = value
        .get("results")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    if results.is_empty() {
        return "No results found.".to_string();
    }
    results
        .iter()
        .map(|r| {
            let title = r
                .get("title")
                .or_else(|| r.get("path"))
                .and_then(Value::as_str)
                .unwrap_or("(untitled)");
            let snippet = r
                .get("snippet")
                .or_else(|| r.get("content"))
                .and_then(Value::as_str)
                .unwrap_or("");
            format!("{title}\n{snippet}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Minimal percent-encoding for query parameters.
fn urlencode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            },
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("hello world"), "hello%20world");
        assert_eq!(urlencode("a+b&c"), "a%2Bb%26c");
        assert_eq!(urlencode("safe-._~"), "safe-._~");
    }

    #[test]
    fn test_format_results() {
        let value = json!({"results": [
            {"title": "Note A", "snippet": "first"},
            {"path": "inbox/b.md", "content": "second"}
        ]});
        let formatted = format_results(&value);
        assert!(formatted.contains("Note A\nfirst"));
        assert!(formatted.contains("inbox/b.md\nsecond"));
    }

    #[test]
    fn test_format_results_empty() {
        assert_eq!(format_results(&json!({})), "No results found.");
    }

    #[tokio::test]
    async fn test_web_fetch_rejects_non_http() {
        let ctx = crate::context::test_context();
        let out = WebFetchTool
            .execute(json!({"url": "file:///etc/passwd"}), &ctx)
            .await;
        assert!(!out.success);
    }
}
