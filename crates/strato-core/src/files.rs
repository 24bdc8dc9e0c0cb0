//! File references and output artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Reference to an uploaded file awaiting processing.
///
/// Extraction happens at upload time; by the time a request reaches the
/// pipeline `extracted_content` is either populated or carries a placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    /// Upload id.
    pub file_id: String,
    /// Original filename.
    pub filename: String,
    /// MIME type reported by the client.
    pub content_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Location in the temp upload directory.
    pub storage_path: PathBuf,
    /// Content extracted at upload time (OCR text, PDF text, file body).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<String>,
}

impl FileRef {
    /// Create a reference for a freshly stored upload.
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        size_bytes: u64,
        storage_path: PathBuf,
    ) -> Self {
        Self {
            file_id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            content_type: content_type.into(),
            size_bytes,
            storage_path,
            extracted_content: None,
        }
    }
}

/// Type tag for a generated artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// Source code files.
    Code,
    /// Structured data (JSON, config).
    Data,
    /// Documentation and prose.
    Text,
}

impl ArtifactType {
    /// Parse from the extraction model's type tag, defaulting to code.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "data" => Self::Data,
            "text" => Self::Text,
            _ => Self::Code,
        }
    }

    /// Stable string tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Data => "data",
            Self::Text => "text",
        }
    }
}

/// A file produced for the user during postprocess.
///
/// Artifacts live in the temp artifact directory under a 12 hour TTL;
/// the file janitor removes expired ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact id.
    pub artifact_id: String,
    /// Suggested filename (extension implies language).
    pub filename: String,
    /// Location in the temp artifact directory.
    pub storage_path: PathBuf,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Type tag.
    pub artifact_type: ArtifactType,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Build artifact metadata for content persisted at `storage_path`.
    pub fn new(
        filename: impl Into<String>,
        storage_path: PathBuf,
        size_bytes: u64,
        artifact_type: ArtifactType,
    ) -> Self {
        Self {
            artifact_id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            storage_path,
            size_bytes,
            artifact_type,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_type_parse() {
        assert_eq!(ArtifactType::parse("code"), ArtifactType::Code);
        assert_eq!(ArtifactType::parse("DATA"), ArtifactType::Data);
        assert_eq!(ArtifactType::parse("text"), ArtifactType::Text);
        assert_eq!(ArtifactType::parse("mystery"), ArtifactType::Code);
    }

    #[test]
    fn test_file_ref_gets_unique_id() {
        let a = FileRef::new("a.txt", "text/plain", 3, PathBuf::from("/tmp/a"));
        let b = FileRef::new("a.txt", "text/plain", 3, PathBuf::from("/tmp/a"));
        assert_ne!(a.file_id, b.file_id);
    }
}
