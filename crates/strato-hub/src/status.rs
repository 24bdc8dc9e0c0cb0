//! Status indicator message pools.

use rand::seq::SliceRandom;

use strato_core::StatusKind;

const PROCESSING_FILES: &[&str] = &[
    "*Processing files...*",
    "*Analyzing files...*",
    "*Reading your files...*",
    "*Examining attachments...*",
];

const THINKING: &[&str] = &[
    "*Thinking...*",
    "*Processing...*",
    "*Working on it...*",
    "*One moment...*",
    "*Analyzing...*",
];

const RETRYING: &[&str] = &["*Retrying with non-streaming mode...*"];

/// Pick a status message for `kind`, formatted `*<text>...*\n\n` so clients
/// can detect and animate it.
#[must_use]
pub fn status_message(kind: StatusKind) -> String {
    let pool = match kind {
        StatusKind::ProcessingFiles => PROCESSING_FILES,
        StatusKind::Thinking => THINKING,
        StatusKind::Retrying => RETRYING,
    };
    let chosen = pool
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("*Processing...*");
    format!("{chosen}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animator::is_status_message;

    #[test]
    fn test_status_messages_match_pattern() {
        for kind in [
            StatusKind::ProcessingFiles,
            StatusKind::Thinking,
            StatusKind::Retrying,
        ] {
            let message = status_message(kind);
            assert!(message.starts_with('*'), "{message:?}");
            assert!(message.ends_with("*\n\n"), "{message:?}");
            assert!(is_status_message(&message), "{message:?}");
        }
    }

    #[test]
    fn test_retrying_is_deterministic() {
        assert_eq!(
            status_message(StatusKind::Retrying),
            "*Retrying with non-streaming mode...*\n\n"
        );
    }
}
