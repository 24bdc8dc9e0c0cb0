//! File context enrichment.

use tracing::debug;

use strato_core::FileRef;

/// Placeholders that mean extraction produced nothing usable.
const INVALID_CONTENT: &[&str] = &[
    "[OCR service not available]",
    "[Processing failed]",
    "[Content extraction failed or unavailable]",
];

/// Append attached-file context blocks to the user message.
///
/// The enriched message is what both the router and the generation model
/// see, so extracted content rides along in a structured block:
///
/// ```text
/// explain this code
///
/// [Attached file: screenshot.png (image/png)]
/// Content:
/// fn quicksort(...)
/// ```
#[must_use]
pub fn enrich_message(message: &str, file_refs: &[FileRef]) -> String {
    if file_refs.is_empty() {
        return message.to_string();
    }

    let mut enriched = message.to_string();
    for file_ref in file_refs {
        enriched.push_str(&format!(
            "\n\n[Attached file: {} ({})]",
            file_ref.filename, file_ref.content_type
        ));
        match &file_ref.extracted_content {
            Some(content) if is_valid_content(content) => {
                enriched.push_str("\nContent:\n");
                enriched.push_str(content);
            },
            _ => enriched.push_str("\n[Content extraction failed or unavailable]"),
        }
    }

    debug!(
        files = file_refs.len(),
        added = enriched.len().saturating_sub(message.len()),
        "message enriched with file context"
    );
    enriched
}

fn is_valid_content(content: &str) -> bool {
    !content.is_empty() && !INVALID_CONTENT.contains(&content)
}
