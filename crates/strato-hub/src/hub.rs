//! The connection registry and ask-user answer channels.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::status::status_message;
use strato_core::{ClientEvent, ClientId, RequestId, StatusKind};

/// One registered client connection.
///
/// `send` returns `false` when the connection is dead; the hub unregisters
/// it on the next failed delivery.
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    /// Deliver an event. Must not block indefinitely on a slow client.
    async fn send(&self, event: &ClientEvent) -> bool;
}

/// Per-client connection registry with event fan-out and the pending
/// `ask_user` answer table.
#[derive(Default)]
pub struct SessionHub {
    connections: DashMap<ClientId, Arc<dyn ConnectionSink>>,
    questions: DashMap<String, oneshot::Sender<String>>,
}

impl SessionHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client connection, replacing any previous one under the
    /// same id (reconnect).
    pub fn register(&self, client_id: ClientId, sink: Arc<dyn ConnectionSink>) {
        info!(client = %client_id, "client registered");
        self.connections.insert(client_id, sink);
    }

    /// Remove a client connection.
    pub fn unregister(&self, client_id: &ClientId) {
        if self.connections.remove(client_id).is_some() {
            info!(client = %client_id, "client unregistered");
        }
    }

    /// Whether a client is connected.
    #[must_use]
    pub fn is_connected(&self, client_id: &ClientId) -> bool {
        self.connections.contains_key(client_id)
    }

    /// Number of active connections.
    #[must_use]
    pub fn count_connections(&self) -> usize {
        self.connections.len()
    }

    /// Send an event to one client. Returns `false` if the client is not
    /// connected or the send failed (the connection is dropped in that
    /// case).
    ///
    /// The registry is only consulted to look the sink up; the send itself
    /// happens outside any map guard.
    pub async fn send_to_client(&self, client_id: &ClientId, event: &ClientEvent) -> bool {
        let Some(sink) = self.connections.get(client_id).map(|s| Arc::clone(&s)) else {
            debug!(client = %client_id, event = event.event_type(), "client not connected");
            return false;
        };

        if sink.send(event).await {
            true
        } else {
            warn!(client = %client_id, "send failed, dropping connection");
            self.unregister(client_id);
            false
        }
    }

    /// Broadcast an event to every client, dropping dead connections.
    pub async fn broadcast(&self, event: &ClientEvent) {
        let targets: Vec<(ClientId, Arc<dyn ConnectionSink>)> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (client_id, sink) in targets {
            if !sink.send(event).await {
                self.unregister(&client_id);
            }
        }
    }

    /// Send an early status indicator (`*Thinking...*` style) for a request.
    pub async fn send_status_indicator(
        &self,
        client_id: &ClientId,
        channel_id: &str,
        message_id: &str,
        kind: StatusKind,
        request_id: &RequestId,
    ) -> bool {
        let event = ClientEvent::EarlyStatus {
            request_id: request_id.clone(),
            content: status_message(kind),
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
        };
        self.send_to_client(client_id, &event).await
    }

    /// Register a pending `ask_user` question for a request, returning the
    /// receiver the tool parks on. A second question for the same request
    /// replaces the first (its waiter resolves with an error).
    #[must_use]
    pub fn register_question(&self, request_id: &RequestId) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.questions.insert(request_id.to_string(), tx);
        rx
    }

    /// Deliver a user's answer to a pending question. Returns `false` when
    /// no question is waiting (late or duplicate answer).
    pub fn answer_question(&self, request_id: &RequestId, answer: String) -> bool {
        match self.questions.remove(request_id.as_str()) {
            Some((_, tx)) => tx.send(answer).is_ok(),
            None => false,
        }
    }

    /// Drop any pending question for a request; its waiter resolves with a
    /// channel error. Used on cancellation and turn teardown.
    pub fn abort_questions(&self, request_id: &RequestId) {
        if self.questions.remove(request_id.as_str()).is_some() {
            debug!(%request_id, "pending question aborted");
        }
    }
}

impl std::fmt::Debug for SessionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHub")
            .field("connections", &self.connections.len())
            .field("pending_questions", &self.questions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        events: Mutex<Vec<String>>,
        alive: std::sync::atomic::AtomicBool,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
                alive: std::sync::atomic::AtomicBool::new(true),
            })
        }
    }

    #[async_trait]
    impl ConnectionSink for RecordingSink {
        async fn send(&self, event: &ClientEvent) -> bool {
            if !self.alive.load(std::sync::atomic::Ordering::SeqCst) {
                return false;
            }
            self.events
                .lock()
                .unwrap()
                .push(event.event_type().to_string());
            true
        }
    }

    #[tokio::test]
    async fn test_register_send_unregister() {
        let hub = SessionHub::new();
        let sink = RecordingSink::new();
        let client = ClientId::new("bot-1");

        hub.register(client.clone(), Arc::clone(&sink) as _);
        assert!(hub.is_connected(&client));
        assert_eq!(hub.count_connections(), 1);

        assert!(hub.send_to_client(&client, &ClientEvent::Pong).await);
        assert_eq!(sink.events.lock().unwrap().as_slice(), ["pong"]);

        hub.unregister(&client);
        assert!(!hub.is_connected(&client));
        assert!(!hub.send_to_client(&client, &ClientEvent::Pong).await);
    }

    #[tokio::test]
    async fn test_dead_connection_dropped_on_send() {
        let hub = SessionHub::new();
        let sink = RecordingSink::new();
        sink.alive.store(false, std::sync::atomic::Ordering::SeqCst);
        let client = ClientId::new("bot-1");

        hub.register(client.clone(), Arc::clone(&sink) as _);
        assert!(!hub.send_to_client(&client, &ClientEvent::Pong).await);
        assert!(!hub.is_connected(&client));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let hub = SessionHub::new();
        let a = RecordingSink::new();
        let b = RecordingSink::new();
        hub.register(ClientId::new("a"), Arc::clone(&a) as _);
        hub.register(ClientId::new("b"), Arc::clone(&b) as _);

        hub.broadcast(&ClientEvent::Pong).await;
        assert_eq!(a.events.lock().unwrap().len(), 1);
        assert_eq!(b.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_question_roundtrip() {
        let hub = SessionHub::new();
        let request_id = RequestId::new();

        let rx = hub.register_question(&request_id);
        assert!(hub.answer_question(&request_id, "yes".to_string()));
        assert_eq!(rx.await.unwrap(), "yes");

        // Answer with nothing pending.
        assert!(!hub.answer_question(&request_id, "again".to_string()));
    }

    #[tokio::test]
    async fn test_abort_question_errors_waiter() {
        let hub = SessionHub::new();
        let request_id = RequestId::new();
        let rx = hub.register_question(&request_id);
        hub.abort_questions(&request_id);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_status_indicator_format() {
        let hub = SessionHub::new();
        let sink = RecordingSink::new();
        let client = ClientId::new("bot-1");
        hub.register(client.clone(), Arc::clone(&sink) as _);

        assert!(
            hub.send_status_indicator(
                &client,
                "chan",
                "msg",
                StatusKind::Thinking,
                &RequestId::new()
            )
            .await
        );
        assert_eq!(sink.events.lock().unwrap().as_slice(), ["early_status"]);
    }
}
