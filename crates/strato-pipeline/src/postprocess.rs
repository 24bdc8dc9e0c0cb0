//! Artifact extraction from model responses.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use strato_core::{Artifact, ArtifactType};
use strato_llm::{ChatClient, GenerationOptions};

const EXTRACTION_PROMPT: &str = "\
Analyze this conversation and extract file creation details.

USER REQUEST: {user_message}

ASSISTANT RESPONSE: {response}

TASK: If the user requested file creation and the response contains code, extract:
1. Filename with the appropriate extension (e.g. \"quicksort.py\", \"config.json\")
2. The complete code/content from the code block
3. Artifact type: \"code\" for programming files, \"data\" for JSON/config, \"text\" for documentation

Respond ONLY with a JSON object in this EXACT format:
{\"filename\": \"example.py\", \"content\": \"the full code here\", \"artifact_type\": \"code\"}

If no file should be created, respond with:
{\"filename\": null}

Extract the FULL content from the code block, not a summary. Only output the JSON object.";

#[derive(Debug, Deserialize)]
struct ExtractedArtifact {
    filename: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    artifact_type: String,
}

/// Extracts artifacts from responses when the preprocess detector flagged
/// file intent.
///
/// All failure paths silently produce no artifact: a turn never fails in
/// postprocess.
pub struct ArtifactExtractor {
    client: Arc<dyn ChatClient>,
}

impl ArtifactExtractor {
    /// Create an extractor over `client`.
    #[must_use]
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }

    /// Extract and persist artifacts for one turn.
    ///
    /// Runs only when `artifact_intent` was detected and the response has a
    /// fenced code block; asks the extraction model for a JSON description,
    /// writes the file into `artifact_dir`, and returns the metadata.
    pub async fn extract(
        &self,
        model: &str,
        user_message: &str,
        response: &str,
        artifact_intent: bool,
        artifact_dir: &Path,
    ) -> Vec<Artifact> {
        if !artifact_intent || !response.contains("```") {
            return Vec::new();
        }

        let prompt = EXTRACTION_PROMPT
            .replace("{user_message}", user_message)
            .replace("{response}", response);

        let raw = match self
            .client
            .complete_simple(
                model,
                &prompt,
                GenerationOptions::default().with_temperature(0.1),
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "artifact extraction call failed");
                return Vec::new();
            },
        };

        let Some(json_text) = extract_json_object(&raw) else {
            warn!("no JSON object in extraction response");
            return Vec::new();
        };

        let parsed: ExtractedArtifact = match serde_json::from_str(json_text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "unparseable extraction JSON");
                return Vec::new();
            },
        };

        let Some(filename) = parsed.filename.filter(|f| !f.is_empty()) else {
            info!("extraction model declined to create an artifact");
            return Vec::new();
        };
        if parsed.content.is_empty() {
            return Vec::new();
        }

        match persist(artifact_dir, &filename, &parsed.content, &parsed.artifact_type).await {
            Ok(artifact) => {
                info!(
                    filename = %artifact.filename,
                    bytes = artifact.size_bytes,
                    "artifact created"
                );
                vec![artifact]
            },
            Err(e) => {
                warn!(error = %e, "could not persist artifact");
                Vec::new()
            },
        }
    }
}

async fn persist(
    dir: &Path,
    filename: &str,
    content: &str,
    type_tag: &str,
) -> std::io::Result<Artifact> {
    tokio::fs::create_dir_all(dir).await?;
    let safe_name = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact.txt".to_string());
    let artifact_id = uuid::Uuid::new_v4();
    let storage_path = dir.join(format!("{artifact_id}_{safe_name}"));
    tokio::fs::write(&storage_path, content).await?;

    Ok(Artifact {
        artifact_id: artifact_id.to_string(),
        filename: safe_name,
        storage_path,
        size_bytes: content.len() as u64,
        artifact_type: ArtifactType::parse(type_tag),
        created_at: chrono::Utc::now(),
    })
}

/// Find the first balanced top-level JSON object in `text`.
///
/// A brace-depth scan that is string- and escape-aware, so nested braces in
/// code content don't truncate the match the way a `\{.*\}` regex would.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            },
            _ => {},
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use strato_llm::{
        ChatMessage, ChatRequest, ChatResponse, LlmError, LlmResult, StopReason, StreamBox, Usage,
    };

    struct Fixed(String);

    #[async_trait]
    impl ChatClient for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn stream(&self, _request: ChatRequest) -> LlmResult<StreamBox> {
            Err(LlmError::RequestFailed("unused".to_string()))
        }

        async fn complete(&self, _request: ChatRequest) -> LlmResult<ChatResponse> {
            Ok(ChatResponse {
                message: ChatMessage::assistant(self.0.clone()),
                tool_calls: Vec::new(),
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            })
        }
    }

    #[test]
    fn test_extract_json_simple() {
        let text = "Here you go: {\"filename\": \"a.py\"} done";
        assert_eq!(extract_json_object(text), Some("{\"filename\": \"a.py\"}"));
    }

    #[test]
    fn test_extract_json_nested_braces() {
        let text = r#"{"filename": "a.py", "content": "fn main() { if x { y() } }"}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_extract_json_braces_in_strings() {
        let text = r#"{"content": "a } b { c", "filename": "x.txt"}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_extract_json_escaped_quote() {
        let text = r#"{"content": "say \"hi\" {now}"}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_extract_json_none() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{unclosed").is_none());
    }

    #[tokio::test]
    async fn test_extraction_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = ArtifactExtractor::new(Arc::new(Fixed(
            r#"{"filename": "sort.py", "content": "def sort(a):\n    return sorted(a)\n", "artifact_type": "code"}"#
                .to_string(),
        )));

        let artifacts = extractor
            .extract(
                "ministral-3:14b",
                "create a python file that sorts",
                "Sure:\n```python\ndef sort(a):\n    return sorted(a)\n```",
                true,
                dir.path(),
            )
            .await;

        assert_eq!(artifacts.len(), 1);
        let artifact = &artifacts[0];
        assert_eq!(artifact.filename, "sort.py");
        assert_eq!(artifact.artifact_type, ArtifactType::Code);

        // File exists and matches the extracted content exactly.
        let written = std::fs::read_to_string(&artifact.storage_path).unwrap();
        assert_eq!(written, "def sort(a):\n    return sorted(a)\n");
        assert_eq!(artifact.size_bytes, written.len() as u64);
    }

    #[tokio::test]
    async fn test_no_intent_skips() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = ArtifactExtractor::new(Arc::new(Fixed("{}".to_string())));
        let artifacts = extractor
            .extract("m", "msg", "```code```", false, dir.path())
            .await;
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_no_code_block_skips() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = ArtifactExtractor::new(Arc::new(Fixed("{}".to_string())));
        let artifacts = extractor
            .extract("m", "create a file", "plain prose", true, dir.path())
            .await;
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_null_filename_skips() {
        let dir = tempfile::tempdir().unwrap();
        let extractor =
            ArtifactExtractor::new(Arc::new(Fixed(r#"{"filename": null}"#.to_string())));
        let artifacts = extractor
            .extract("m", "create a file", "```x```", true, dir.path())
            .await;
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_drops_silently() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = ArtifactExtractor::new(Arc::new(Fixed("not json at all".to_string())));
        let artifacts = extractor
            .extract("m", "create a file", "```x```", true, dir.path())
            .await;
        assert!(artifacts.is_empty());
    }
}
