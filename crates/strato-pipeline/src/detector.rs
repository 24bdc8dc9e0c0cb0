//! Output artifact intent detection.

use std::sync::Arc;
use tracing::{info, warn};

use strato_llm::{ChatClient, GenerationOptions};

const DETECTION_PROMPT: &str = "\
You are an intent classifier for file creation requests.

Analyze the user's message and determine if they want you to CREATE A FILE as output.

Examples of file creation intent:
- \"create a Python file for quicksort\" -> YES
- \"generate a config.json for my app\" -> YES
- \"make a markdown document about REST APIs\" -> YES
- \"save this as a script\" -> YES
- \"write a function to reverse a string\" -> NO (just wants code, not a file)
- \"explain how to create a file in Python\" -> NO (asking for explanation)
- \"what's the difference between lists and tuples?\" -> NO (question, no file requested)

Output ONLY \"YES\" if the user wants a file created, or \"NO\" if they don't. Nothing else.";

/// Asks a small model whether the user wants a downloadable file.
///
/// Detection errors default to `false`: a missed artifact is recoverable,
/// a failed turn is not.
pub struct ArtifactDetector {
    client: Arc<dyn ChatClient>,
}

impl ArtifactDetector {
    /// Create a detector over `client`.
    #[must_use]
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }

    /// Whether `user_message` asks for file output.
    pub async fn detect(&self, model: &str, user_message: &str) -> bool {
        let prompt = format!("{DETECTION_PROMPT}\n\nUSER MESSAGE: {user_message}");
        match self
            .client
            .complete_simple(
                model,
                &prompt,
                GenerationOptions::default().with_temperature(0.1),
            )
            .await
        {
            Ok(response) => {
                let wants_file = response.trim().to_uppercase().contains("YES");
                info!(wants_file, "artifact intent detection");
                wants_file
            },
            Err(e) => {
                warn!(error = %e, "artifact detection failed, assuming no");
                false
            },
        }
    }
}
