//! File tools: workspace reads/writes, attachments, artifact creation.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Component, Path, PathBuf};

use crate::context::ExecutionContext;
use crate::registry::{Tool, ToolOutput};
use strato_core::{Artifact, ArtifactType};

/// Resolve a user-supplied relative path inside `root`, rejecting absolute
/// paths and any `..` traversal.
fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return Err("absolute paths are not allowed".to_string());
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {},
            _ => return Err("path traversal is not allowed".to_string()),
        }
    }
    Ok(root.join(candidate))
}

/// Read a file from the turn workspace.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a text file from the workspace. Provide a path relative to the workspace root."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Relative file path"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(path) = args.get("path").and_then(Value::as_str) else {
            return ToolOutput::err("path is required");
        };
        let full = match resolve_within(&ctx.workspace_dir, path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(e),
        };
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => ToolOutput::ok(content),
            Err(e) => ToolOutput::err(format!("could not read {path}: {e}")),
        }
    }
}

/// Write a file: lands in the artifact directory and is registered as an
/// artifact so the user receives it with the response.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write a file for the user to download. Provide a filename and the complete content."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filename": {"type": "string", "description": "Filename with extension"},
                "content": {"type": "string", "description": "Complete file content"}
            },
            "required": ["filename", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(filename) = args.get("filename").and_then(Value::as_str) else {
            return ToolOutput::err("filename is required");
        };
        let Some(content) = args.get("content").and_then(Value::as_str) else {
            return ToolOutput::err("content is required");
        };
        // Strip any directory parts; artifacts are flat.
        let safe_name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact.txt".to_string());

        let artifact_id = uuid::Uuid::new_v4().to_string();
        let storage_path = ctx.artifact_dir.join(format!("{artifact_id}_{safe_name}"));

        if let Err(e) = tokio::fs::create_dir_all(&ctx.artifact_dir).await {
            return ToolOutput::err(format!("could not create artifact dir: {e}"));
        }
        if let Err(e) = tokio::fs::write(&storage_path, content).await {
            return ToolOutput::err(format!("could not write {safe_name}: {e}"));
        }

        let artifact = Artifact::new(
            safe_name.clone(),
            storage_path,
            content.len() as u64,
            ArtifactType::Code,
        );
        ctx.record_artifact(artifact).await;

        ToolOutput::ok(format!("Wrote {safe_name} ({} bytes)", content.len()))
    }
}

/// List the files attached to the current request.
pub struct ListAttachmentsTool;

#[async_trait]
impl Tool for ListAttachmentsTool {
    fn name(&self) -> &'static str {
        "list_attachments"
    }

    fn description(&self) -> &'static str {
        "List the files the user attached to this request."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value, ctx: &ExecutionContext) -> ToolOutput {
        if ctx.file_refs.is_empty() {
            return ToolOutput::ok("No files attached.");
        }
        let listing: Vec<String> = ctx
            .file_refs
            .iter()
            .map(|f| format!("{} ({}, {} bytes)", f.filename, f.content_type, f.size_bytes))
            .collect();
        ToolOutput::ok(listing.join("\n"))
    }
}

/// Fetch the extracted content of an attached file by name.
pub struct GetFileContentTool;

#[async_trait]
impl Tool for GetFileContentTool {
    fn name(&self) -> &'static str {
        "get_file_content"
    }

    fn description(&self) -> &'static str {
        "Get the extracted text content of an attached file by its filename."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filename": {"type": "string", "description": "Attached filename"}
            },
            "required": ["filename"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> ToolOutput {
        let Some(filename) = args.get("filename").and_then(Value::as_str) else {
            return ToolOutput::err("filename is required");
        };
        let Some(file_ref) = ctx.file_refs.iter().find(|f| f.filename == filename) else {
            return ToolOutput::err(format!("no attached file named '{filename}'"));
        };
        match &file_ref.extracted_content {
            Some(content) => ToolOutput::ok(content.clone()),
            None => ToolOutput::err(format!("no extracted content for '{filename}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use strato_core::FileRef;

    #[tokio::test]
    async fn test_write_then_read_artifact_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = test_context();
        ctx.artifact_dir = dir.path().to_path_buf();

        let out = WriteFileTool
            .execute(
                json!({"filename": "hello.py", "content": "print('hi')\n"}),
                &ctx,
            )
            .await;
        assert!(out.success, "{out:?}");

        let artifacts = ctx.artifacts().await;
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].filename, "hello.py");

        // Saved artifact reads back byte-identical.
        let saved = std::fs::read_to_string(&artifacts[0].storage_path).unwrap();
        assert_eq!(saved, "print('hi')\n");
        assert_eq!(artifacts[0].size_bytes, saved.len() as u64);
    }

    #[tokio::test]
    async fn test_read_file_traversal_rejected() {
        let ctx = test_context();
        let out = ReadFileTool
            .execute(json!({"path": "../etc/passwd"}), &ctx)
            .await;
        assert!(!out.success);

        let out = ReadFileTool
            .execute(json!({"path": "/etc/passwd"}), &ctx)
            .await;
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_read_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.txt"), "contents").unwrap();
        let mut ctx = test_context();
        ctx.workspace_dir = dir.path().to_path_buf();

        let out = ReadFileTool.execute(json!({"path": "note.txt"}), &ctx).await;
        assert!(out.success);
        assert_eq!(out.content, "contents");
    }

    #[tokio::test]
    async fn test_attachment_tools() {
        let mut ctx = test_context();
        let mut file_ref = FileRef::new("scan.png", "image/png", 123, PathBuf::from("/tmp/x"));
        file_ref.extracted_content = Some("ocr text".to_string());
        ctx.file_refs = vec![file_ref];

        let listing = ListAttachmentsTool.execute(json!({}), &ctx).await;
        assert!(listing.content.contains("scan.png"));

        let content = GetFileContentTool
            .execute(json!({"filename": "scan.png"}), &ctx)
            .await;
        assert_eq!(content.content, "ocr text");

        let missing = GetFileContentTool
            .execute(json!({"filename": "other.png"}), &ctx)
            .await;
        assert!(!missing.success);
    }
}
