//! Conversation summarization.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::PipelineResult;
use crate::prompts::PromptComposer;
use strato_core::ThreadId;
use strato_llm::{ChatClient, GenerationOptions};
use strato_storage::{ConversationStore, StoredMessage, StoredRole};

/// Messages kept verbatim when summarizing.
const KEEP_RECENT: usize = 5;

/// Prunes oversized conversations into a single summary message.
pub struct Summarizer {
    client: Arc<dyn ChatClient>,
    store: ConversationStore,
    composer: PromptComposer,
}

impl Summarizer {
    /// Create a summarizer.
    #[must_use]
    pub fn new(client: Arc<dyn ChatClient>, store: ConversationStore) -> Self {
        Self {
            client,
            store,
            composer: PromptComposer::new(),
        }
    }

    /// Summarize the thread if its token total has reached `threshold`
    /// (inclusive).
    ///
    /// All but the last [`KEEP_RECENT`] messages are summarized via
    /// `summarization_model` (temperature 0.3), deleted from storage, and
    /// replaced with one system summary message. Returns the refreshed
    /// message list either way.
    ///
    /// # Errors
    ///
    /// Returns a storage error if reads or writes fail; summarization-model
    /// failures leave the conversation untouched.
    pub async fn maybe_summarize(
        &self,
        thread_id: &ThreadId,
        summarization_model: &str,
        threshold: u64,
    ) -> PipelineResult<Vec<StoredMessage>> {
        let messages = self.store.thread_messages(thread_id).await?;
        let total_tokens: u64 = messages.iter().map(|m| m.token_count).sum();

        if total_tokens < threshold || messages.len() <= KEEP_RECENT {
            return Ok(messages);
        }

        let split_at = messages.len() - KEEP_RECENT;
        let (old, recent) = messages.split_at(split_at);

        let conversation = old
            .iter()
            .map(|m| {
                let role = match m.role {
                    StoredRole::User => "USER",
                    StoredRole::Assistant => "ASSISTANT",
                    StoredRole::System => "SYSTEM",
                };
                format!("{role}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let summary = match self
            .client
            .complete_simple(
                summarization_model,
                &self.composer.summarization_prompt(&conversation),
                GenerationOptions::default().with_temperature(0.3),
            )
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                // Degrade gracefully: an oversized context is better than a
                // failed turn.
                warn!(error = %e, "summarization failed, keeping full context");
                return Ok(messages);
            },
        };

        let old_timestamps: Vec<i64> = old.iter().map(|m| m.timestamp_ms).collect();
        self.store.delete_messages(thread_id, old_timestamps).await?;

        let summary_content = format!("[SUMMARY OF PREVIOUS CONVERSATION]\n{summary}");
        let mut summary_message =
            StoredMessage::new(thread_id, StoredRole::System, summary_content)
                .with_model(summarization_model);
        summary_message.is_summary = true;
        // Stamp the summary ahead of the kept messages so ordering holds.
        summary_message.timestamp_ms = recent
            .first()
            .map_or_else(|| chrono::Utc::now().timestamp_millis(), |m| m.timestamp_ms - 1);
        self.store.append(summary_message.clone()).await?;

        info!(
            evicted = old.len(),
            kept = recent.len(),
            "conversation summarized"
        );

        let mut result = vec![summary_message];
        result.extend_from_slice(recent);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use strato_llm::{
        ChatMessage, ChatRequest, ChatResponse, LlmError, LlmResult, StopReason, StreamBox, Usage,
    };
    use strato_storage::Database;

    struct FixedSummary;

    #[async_trait]
    impl ChatClient for FixedSummary {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn stream(&self, _request: ChatRequest) -> LlmResult<StreamBox> {
            Err(LlmError::RequestFailed("unused".to_string()))
        }

        async fn complete(&self, _request: ChatRequest) -> LlmResult<ChatResponse> {
            Ok(ChatResponse {
                message: ChatMessage::assistant("- user asked things\n- they were answered"),
                tool_calls: Vec::new(),
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            })
        }
    }

    async fn seeded_store(thread: &ThreadId, count: usize, tokens_each: u64) -> ConversationStore {
        let store = ConversationStore::new(Database::connect_memory().await.unwrap());
        for i in 0..count {
            let mut msg = StoredMessage::new(thread, StoredRole::User, format!("message {i}"))
                .with_token_count(tokens_each);
            msg.timestamp_ms = 1000 + i as i64;
            store.append(msg).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_below_threshold_untouched() {
        let thread = ThreadId::new("t");
        let store = seeded_store(&thread, 10, 10).await;
        let summarizer = Summarizer::new(Arc::new(FixedSummary), store.clone());

        let messages = summarizer
            .maybe_summarize(&thread, "gpt-oss:20b", 9000)
            .await
            .unwrap();
        assert_eq!(messages.len(), 10);
        assert!(!messages.iter().any(|m| m.is_summary));
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let thread = ThreadId::new("t");
        // 10 messages x 100 tokens = exactly 1000.
        let store = seeded_store(&thread, 10, 100).await;
        let summarizer = Summarizer::new(Arc::new(FixedSummary), store.clone());

        let messages = summarizer
            .maybe_summarize(&thread, "gpt-oss:20b", 1000)
            .await
            .unwrap();

        // 1 summary + 5 kept.
        assert_eq!(messages.len(), 6);
        assert!(messages[0].is_summary);
        assert!(messages[0].content.starts_with("[SUMMARY OF PREVIOUS CONVERSATION]"));

        // Storage reflects the prune.
        let stored = store.thread_messages(&thread).await.unwrap();
        assert_eq!(stored.len(), 6);
        assert!(stored[0].is_summary);
        assert_eq!(stored.last().unwrap().content, "message 9");
    }

    #[tokio::test]
    async fn test_recent_messages_survive() {
        let thread = ThreadId::new("t");
        let store = seeded_store(&thread, 8, 500).await;
        let summarizer = Summarizer::new(Arc::new(FixedSummary), store.clone());

        let messages = summarizer
            .maybe_summarize(&thread, "gpt-oss:20b", 1000)
            .await
            .unwrap();
        let kept: Vec<&str> = messages
            .iter()
            .filter(|m| !m.is_summary)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            kept,
            vec!["message 3", "message 4", "message 5", "message 6", "message 7"]
        );
    }
}
