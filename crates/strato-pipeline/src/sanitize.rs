//! Interface-specific output strategies.
//!
//! Chat-style interfaces (Discord) strip artifact-request phrasing before
//! routing so the classifier sees the content ask, not the format ask, and
//! chunk responses at the platform message limit. Terminal/IDE interfaces
//! pass everything through.

use regex::Regex;
use std::sync::LazyLock;

/// Interface-specific prompt sanitation and output formatting.
pub trait OutputStrategy: Send + Sync {
    /// Strategy name.
    fn name(&self) -> &'static str;

    /// Sanitize the prompt before classification.
    fn sanitize_prompt(&self, message: &str) -> String;

    /// Message length limit for chunking; `None` means unchunked.
    fn chunk_limit(&self) -> Option<usize>;
}

static FILE_REQUEST_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bsave (?:it|this|that)? ?(?:to|as|in)? ?a? ?\.?\w* ?file\b",
        r"(?i)\b(?:create|make|generate|write) (?:me )?a file\b",
        r"(?i)\b(?:as|to|into) a? ?\.(?:py|js|ts|json|md|txt|rs|go|sh) file\b",
        r"(?i)\bdownloadable file\b",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("static regex"))
    .collect()
});

/// Discord-style strategy: strip file-request phrasing, chunk at 2000 chars.
#[derive(Debug, Default)]
pub struct DiscordStrategy;

impl OutputStrategy for DiscordStrategy {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn sanitize_prompt(&self, message: &str) -> String {
        let mut sanitized = message.to_string();
        for pattern in FILE_REQUEST_PATTERNS.iter() {
            sanitized = pattern.replace_all(&sanitized, "").into_owned();
        }
        // Collapse the whitespace the removals leave behind.
        let collapsed = sanitized.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            message.to_string()
        } else {
            collapsed
        }
    }

    fn chunk_limit(&self) -> Option<usize> {
        Some(2000)
    }
}

/// Terminal/IDE strategy: no sanitation, no chunking.
#[derive(Debug, Default)]
pub struct PassthroughStrategy;

impl OutputStrategy for PassthroughStrategy {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn sanitize_prompt(&self, message: &str) -> String {
        message.to_string()
    }

    fn chunk_limit(&self) -> Option<usize> {
        None
    }
}

/// Strategy for an interface name.
#[must_use]
pub fn strategy_for_interface(interface: &str) -> Box<dyn OutputStrategy> {
    match interface {
        "discord" => Box::new(DiscordStrategy),
        _ => Box::new(PassthroughStrategy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discord_strips_file_language() {
        let strategy = DiscordStrategy;
        let sanitized =
            strategy.sanitize_prompt("implement quicksort and save it to a .py file please");
        assert!(!sanitized.contains("file"), "{sanitized:?}");
        assert!(sanitized.contains("quicksort"));
    }

    #[test]
    fn test_discord_keeps_content_only_prompt() {
        let strategy = DiscordStrategy;
        let message = "explain the borrow checker";
        assert_eq!(strategy.sanitize_prompt(message), message);
    }

    #[test]
    fn test_discord_never_returns_empty() {
        let strategy = DiscordStrategy;
        let sanitized = strategy.sanitize_prompt("create me a file");
        assert!(!sanitized.is_empty());
    }

    #[test]
    fn test_passthrough_unchanged() {
        let strategy = PassthroughStrategy;
        let message = "save this to a file: fn main() {}";
        assert_eq!(strategy.sanitize_prompt(message), message);
        assert!(strategy.chunk_limit().is_none());
    }

    #[test]
    fn test_strategy_lookup() {
        assert_eq!(strategy_for_interface("discord").name(), "discord");
        assert_eq!(strategy_for_interface("web").name(), "passthrough");
        assert_eq!(strategy_for_interface("cli").name(), "passthrough");
    }
}
