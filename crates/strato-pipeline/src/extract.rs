//! Typed file content extraction.
//!
//! Uploads route to an extractor by extension or MIME type. Every failure
//! degrades to a placeholder string; extraction never aborts a turn.

use async_trait::async_trait;
use base64::Engine;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use strato_llm::{ChatClient, ChatMessage, ChatRequest, GenerationOptions};
use strato_profile::ProfileRegistry;

/// How an extraction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    /// Content extracted.
    Success,
    /// Extraction ran but failed; text holds a placeholder.
    Error,
    /// No extractor handles this file type.
    Unsupported,
}

/// Result of extracting one file.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Extracted text or a placeholder.
    pub text: String,
    /// Which extractor produced it.
    pub extractor: &'static str,
    /// Outcome.
    pub status: ExtractionStatus,
}

/// One content extractor.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// File extensions handled (lowercase, with leading dot).
    fn extensions(&self) -> HashSet<&'static str>;

    /// MIME types handled.
    fn mime_types(&self) -> HashSet<&'static str>;

    /// Extract content from the file at `path`.
    async fn extract(&self, path: &Path, filename: &str) -> Extraction;
}

/// Routes a file to the first extractor claiming its type.
#[derive(Default)]
pub struct ExtractionRouter {
    extractors: Vec<Arc<dyn ContentExtractor>>,
}

impl ExtractionRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor. Order matters: first match wins.
    pub fn register(&mut self, extractor: Arc<dyn ContentExtractor>) {
        self.extractors.push(extractor);
    }

    /// Extract content, degrading to an unsupported placeholder when no
    /// extractor claims the type.
    pub async fn extract(&self, path: &Path, content_type: &str) -> Extraction {
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        for extractor in &self.extractors {
            if extractor.extensions().contains(extension.as_str())
                || extractor.mime_types().contains(content_type)
            {
                return extractor.extract(path, &filename).await;
            }
        }

        warn!(file = %filename, content_type, "unsupported file type");
        Extraction {
            text: format!("[Unsupported file type: {extension}]"),
            extractor: "none",
            status: ExtractionStatus::Unsupported,
        }
    }
}

/// OCR via the active profile's vision model.
pub struct ImageExtractor {
    client: Arc<dyn ChatClient>,
    profiles: Arc<ProfileRegistry>,
}

impl ImageExtractor {
    /// Create an image extractor running OCR through `client`.
    #[must_use]
    pub fn new(client: Arc<dyn ChatClient>, profiles: Arc<ProfileRegistry>) -> Self {
        Self { client, profiles }
    }
}

#[async_trait]
impl ContentExtractor for ImageExtractor {
    fn extensions(&self) -> HashSet<&'static str> {
        [".png", ".jpg", ".jpeg", ".gif", ".bmp", ".tiff", ".webp"]
            .into_iter()
            .collect()
    }

    fn mime_types(&self) -> HashSet<&'static str> {
        [
            "image/png",
            "image/jpeg",
            "image/gif",
            "image/bmp",
            "image/tiff",
            "image/webp",
        ]
        .into_iter()
        .collect()
    }

    async fn extract(&self, path: &Path, filename: &str) -> Extraction {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Extraction {
                    text: format!("[OCR processing failed: {e}]"),
                    extractor: "image_ocr",
                    status: ExtractionStatus::Error,
                };
            },
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

        let vision_model = self.profiles.active().roles.vision.clone();
        let request = ChatRequest::new(
            &vision_model,
            vec![ChatMessage::user_with_image(
                "Extract all text from this image. Output only the extracted text.",
                encoded,
            )],
        )
        .with_options(GenerationOptions::default().with_temperature(0.0));

        match self.client.complete(request).await {
            Ok(response) => {
                let text = response.text().to_string();
                info!(file = %filename, chars = text.len(), "OCR extracted");
                Extraction {
                    text,
                    extractor: "image_ocr",
                    status: ExtractionStatus::Success,
                }
            },
            Err(e) => {
                warn!(file = %filename, error = %e, "OCR failed");
                Extraction {
                    text: format!("[OCR processing failed: {e}]"),
                    extractor: "image_ocr",
                    status: ExtractionStatus::Error,
                }
            },
        }
    }
}

/// PDF text extraction.
pub struct PdfExtractor;

#[async_trait]
impl ContentExtractor for PdfExtractor {
    fn extensions(&self) -> HashSet<&'static str> {
        [".pdf"].into_iter().collect()
    }

    fn mime_types(&self) -> HashSet<&'static str> {
        ["application/pdf"].into_iter().collect()
    }

    async fn extract(&self, path: &Path, filename: &str) -> Extraction {
        let path = path.to_path_buf();
        let name = filename.to_string();
        // pdf parsing is CPU-bound; keep it off the runtime threads.
        let result = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path)).await;

        match result {
            Ok(Ok(text)) => {
                info!(file = %name, chars = text.len(), "PDF extracted");
                Extraction {
                    text,
                    extractor: "pdf",
                    status: ExtractionStatus::Success,
                }
            },
            Ok(Err(e)) => {
                warn!(file = %name, error = %e, "PDF extraction failed");
                Extraction {
                    text: format!("[PDF extraction failed: {e}]"),
                    extractor: "pdf",
                    status: ExtractionStatus::Error,
                }
            },
            Err(e) => Extraction {
                text: format!("[PDF extraction failed: {e}]"),
                extractor: "pdf",
                status: ExtractionStatus::Error,
            },
        }
    }
}

/// Direct read for text and code files.
pub struct TextExtractor;

#[async_trait]
impl ContentExtractor for TextExtractor {
    fn extensions(&self) -> HashSet<&'static str> {
        [
            ".txt", ".md", ".csv", ".log", ".py", ".js", ".ts", ".tsx", ".jsx", ".json", ".yaml",
            ".yml", ".toml", ".html", ".xml", ".css", ".sql", ".sh", ".bash", ".rs", ".go", ".c",
            ".cpp", ".h",
        ]
        .into_iter()
        .collect()
    }

    fn mime_types(&self) -> HashSet<&'static str> {
        [
            "text/plain",
            "text/markdown",
            "text/csv",
            "text/html",
            "text/xml",
            "text/css",
            "application/json",
            "application/javascript",
            "application/x-yaml",
        ]
        .into_iter()
        .collect()
    }

    async fn extract(&self, path: &Path, filename: &str) -> Extraction {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Extraction {
                text,
                extractor: "text",
                status: ExtractionStatus::Success,
            },
            Err(e) => {
                warn!(file = %filename, error = %e, "text read failed");
                Extraction {
                    text: format!("[Text extraction failed: {e}]"),
                    extractor: "text",
                    status: ExtractionStatus::Error,
                }
            },
        }
    }
}
