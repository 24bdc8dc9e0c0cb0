//! Conversation message storage.

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::StorageResult;
use strato_core::ThreadId;

/// Role of a stored conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredRole {
    /// End user input.
    User,
    /// Model output.
    Assistant,
    /// Injected system content (summaries).
    System,
}

/// One message in a conversation thread.
///
/// Keyed by `(thread_id, timestamp_ms)`; timestamps are epoch milliseconds
/// so range ordering is a plain integer sort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Owning thread.
    pub thread_id: String,
    /// Message role.
    pub role: StoredRole,
    /// Message text.
    pub content: String,
    /// Token count at write time.
    pub token_count: u64,
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
    /// Model that produced an assistant message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    /// Whether this message is a summarization artifact.
    #[serde(default)]
    pub is_summary: bool,
}

impl StoredMessage {
    /// Create a message stamped now.
    pub fn new(thread_id: &ThreadId, role: StoredRole, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            thread_id: thread_id.to_string(),
            role,
            token_count: (content.len() / 4) as u64,
            content,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            model_used: None,
            is_summary: false,
        }
    }

    /// Attach the producing model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_used = Some(model.into());
        self
    }

    /// Override the token count.
    #[must_use]
    pub fn with_token_count(mut self, tokens: u64) -> Self {
        self.token_count = tokens;
        self
    }
}

/// Store for conversation threads.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    db: Database,
}

impl ConversationStore {
    /// Create a store over `db`.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a message to its thread.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn append(&self, message: StoredMessage) -> StorageResult<()> {
        self.db
            .client()
            .query("CREATE message CONTENT $data")
            .bind(("data", message))
            .await?
            .check()?;
        Ok(())
    }

    /// All messages of a thread, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn thread_messages(&self, thread_id: &ThreadId) -> StorageResult<Vec<StoredMessage>> {
        let mut response = self
            .db
            .client()
            .query("SELECT * FROM message WHERE thread_id = $thread ORDER BY timestamp_ms ASC")
            .bind(("thread", thread_id.to_string()))
            .await?;
        let rows: Vec<StoredMessage> = response.take(0)?;
        Ok(rows)
    }

    /// Delete specific messages of a thread by timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn delete_messages(
        &self,
        thread_id: &ThreadId,
        timestamps_ms: Vec<i64>,
    ) -> StorageResult<()> {
        self.db
            .client()
            .query(
                "DELETE message WHERE thread_id = $thread AND timestamp_ms INSIDE $stamps",
            )
            .bind(("thread", thread_id.to_string()))
            .bind(("stamps", timestamps_ms))
            .await?
            .check()?;
        Ok(())
    }

    /// Sum of token counts across a thread.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn thread_token_total(&self, thread_id: &ThreadId) -> StorageResult<u64> {
        let messages = self.thread_messages(thread_id).await?;
        Ok(messages.iter().map(|m| m.token_count).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> ConversationStore {
        ConversationStore::new(Database::connect_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_append_and_range() {
        let store = store().await;
        let thread = ThreadId::new("t1");

        let mut first = StoredMessage::new(&thread, StoredRole::User, "hello");
        first.timestamp_ms = 1000;
        let mut second = StoredMessage::new(&thread, StoredRole::Assistant, "hi there")
            .with_model("gpt-oss:20b");
        second.timestamp_ms = 2000;

        store.append(second).await.unwrap();
        store.append(first).await.unwrap();

        let messages = store.thread_messages(&thread).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].model_used.as_deref(), Some("gpt-oss:20b"));
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let store = store().await;
        store
            .append(StoredMessage::new(&ThreadId::new("a"), StoredRole::User, "in a"))
            .await
            .unwrap();
        store
            .append(StoredMessage::new(&ThreadId::new("b"), StoredRole::User, "in b"))
            .await
            .unwrap();

        let a = store.thread_messages(&ThreadId::new("a")).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].content, "in a");
    }

    #[tokio::test]
    async fn test_delete_by_timestamp() {
        let store = store().await;
        let thread = ThreadId::new("t");
        for (ts, text) in [(1000, "one"), (2000, "two"), (3000, "three")] {
            let mut msg = StoredMessage::new(&thread, StoredRole::User, text);
            msg.timestamp_ms = ts;
            store.append(msg).await.unwrap();
        }

        store.delete_messages(&thread, vec![1000, 2000]).await.unwrap();
        let remaining = store.thread_messages(&thread).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "three");
    }

    #[tokio::test]
    async fn test_token_total() {
        let store = store().await;
        let thread = ThreadId::new("t");
        store
            .append(StoredMessage::new(&thread, StoredRole::User, "x").with_token_count(10))
            .await
            .unwrap();
        store
            .append(StoredMessage::new(&thread, StoredRole::Assistant, "y").with_token_count(32))
            .await
            .unwrap();
        assert_eq!(store.thread_token_total(&thread).await.unwrap(), 42);
    }
}
