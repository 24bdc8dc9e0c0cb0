//! Layered system prompt composition.
//!
//! Prompts compose from layers, in order: role identity, the file-creation
//! protocol (only when artifact intent was detected), the route's task
//! prompt with placeholder substitution, and the user's base prompt.

use chrono::Utc;

use strato_router::Route;

const ROLE_LAYER: &str = "\
You are Strato, a capable assistant running on self-hosted models. You are \
direct, accurate, and concise. You have access to tools; use them when they \
genuinely help rather than guessing.";

const FILE_CREATION_PROTOCOL: &str = "\
FILE CREATION PROTOCOL: The user wants a downloadable file. Put the complete \
file content in a single fenced code block with the correct language tag. Do \
not abbreviate or elide content with comments like 'rest unchanged'. State \
the intended filename on the line before the code block.";

const TOOL_USAGE_RULES: &str = "\
Tool rules: call a tool only when you need information you don't have or an \
effect you can't produce in text. After a tool result, continue the task; do \
not narrate the tool call itself. If a tool fails, try a different approach \
or explain what you could not do. Ask the user with ask_user only when \
genuinely blocked on their input.";

const FORMAT_RULES: &str = "\
Formatting: use fenced code blocks with language tags for code. Keep answers \
tight; no filler phrases. Use lists only when structure helps.";

const MATH_PROMPT: &str = "\
Task: solve the mathematical problem. Show the key steps, not every \
manipulation. Verify the result where a quick check exists (today: {current_date}).

{tool_usage_rules}

{format_rules}";

const SIMPLE_CODE_PROMPT: &str = "\
Task: write or fix the requested code. Produce complete, runnable code; \
include a short usage note when the interface is not obvious (today: {current_date}).

{tool_usage_rules}

{format_rules}";

const COMPLEX_CODE_PROMPT: &str = "\
Task: design and implement the requested system. Start from the architecture \
(components, data flow, interfaces), then implement the core. Call out \
trade-offs you made (today: {current_date}).

{tool_usage_rules}

{format_rules}";

const REASONING_PROMPT: &str = "\
Task: analyze the question. Lay out the considerations that actually \
discriminate between options, weigh them, and commit to a recommendation. \
Use web_search for at most {fetch_limit} sources when current facts matter \
(today: {current_date}).

{tool_usage_rules}

{format_rules}";

const RESEARCH_PROMPT: &str = "\
Task: research the topic in depth. Use web_search and web_fetch for up to \
{fetch_limit} sources, cross-check claims across sources, and cite what you \
used. Distinguish established facts from recent or contested ones \
(today: {current_date}).

{tool_usage_rules}

{format_rules}";

const SELF_HANDLE_PROMPT: &str = "\
Task: answer directly and conversationally (today: {current_date}).

{format_rules}";

/// Composes layered system prompts for agent turns.
#[derive(Debug, Default)]
pub struct PromptComposer;

impl PromptComposer {
    /// Create a composer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compose the full system prompt for one turn.
    #[must_use]
    pub fn compose(
        &self,
        route: Route,
        artifact_intent: bool,
        fetch_limit: u32,
        user_base_prompt: Option<&str>,
    ) -> String {
        let mut layers = vec![ROLE_LAYER.to_string()];

        if artifact_intent {
            layers.push(FILE_CREATION_PROTOCOL.to_string());
        }

        let task = match route {
            Route::Math => MATH_PROMPT,
            Route::SimpleCode => SIMPLE_CODE_PROMPT,
            Route::ComplexCode => COMPLEX_CODE_PROMPT,
            Route::Reasoning => REASONING_PROMPT,
            Route::Research => RESEARCH_PROMPT,
            Route::SelfHandle => SELF_HANDLE_PROMPT,
        };
        layers.push(
            task.replace("{current_date}", &Utc::now().format("%Y-%m-%d").to_string())
                .replace("{tool_usage_rules}", TOOL_USAGE_RULES)
                .replace("{format_rules}", FORMAT_RULES)
                .replace("{fetch_limit}", &fetch_limit.to_string()),
        );

        if let Some(base) = user_base_prompt.filter(|b| !b.is_empty()) {
            layers.push(format!("User instructions:\n{base}"));
        }

        layers.join("\n\n")
    }

    /// Summarization prompt for conversation pruning.
    #[must_use]
    pub fn summarization_prompt(&self, conversation: &str) -> String {
        format!(
            "You are a conversation summarizer. Create a concise summary of the \
conversation below.\n\n\
Focus on: what the user requested, what was done, key technical points, and \
unresolved items. Write in past tense, use bullet points, and stay under 500 \
tokens.\n\n\
Conversation to summarize:\n{conversation}\n\nSummary:"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_in_order() {
        let prompt = PromptComposer::new().compose(Route::Math, false, 3, None);
        assert!(prompt.starts_with(ROLE_LAYER));
        assert!(prompt.contains("Task: solve the mathematical problem"));
        assert!(!prompt.contains("FILE CREATION PROTOCOL"));
    }

    #[test]
    fn test_artifact_layer_conditional() {
        let prompt = PromptComposer::new().compose(Route::SimpleCode, true, 3, None);
        let role_pos = prompt.find("You are Strato").unwrap();
        let protocol_pos = prompt.find("FILE CREATION PROTOCOL").unwrap();
        let task_pos = prompt.find("Task:").unwrap();
        assert!(role_pos < protocol_pos && protocol_pos < task_pos);
    }

    #[test]
    fn test_placeholders_substituted() {
        let prompt = PromptComposer::new().compose(Route::Research, false, 5, None);
        assert!(!prompt.contains("{current_date}"));
        assert!(!prompt.contains("{tool_usage_rules}"));
        assert!(!prompt.contains("{fetch_limit}"));
        assert!(prompt.contains("up to 5 sources"));
    }

    #[test]
    fn test_user_base_prompt_last() {
        let prompt =
            PromptComposer::new().compose(Route::SelfHandle, false, 3, Some("Be very formal"));
        assert!(prompt.ends_with("User instructions:\nBe very formal"));
    }

    #[test]
    fn test_empty_base_prompt_skipped() {
        let prompt = PromptComposer::new().compose(Route::SelfHandle, false, 3, Some(""));
        assert!(!prompt.contains("User instructions"));
    }
}
