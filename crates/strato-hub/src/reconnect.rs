//! Outbound reconnecting WebSocket client (bot → orchestrator).
//!
//! Maintains the bot side of the chat link: connect, handshake on
//! `session_start`, heartbeat every 30 s, and reconnect with exponential
//! backoff when the socket closes. Queued work is unaffected by a drop:
//! request state lives in the orchestrator's queue, so a reconnected client
//! resumes receiving events for work it enqueued earlier.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use strato_core::RequestId;

type WsSink =
    futures::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Handles messages arriving from the orchestrator.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Process one decoded event.
    async fn handle(&self, event: Value);
}

/// Client tuning.
#[derive(Debug, Clone)]
pub struct ReconnectingClientConfig {
    /// WebSocket URL including query parameters.
    pub url: String,
    /// Initial reconnect delay.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Heartbeat interval.
    pub ping_interval: Duration,
}

impl ReconnectingClientConfig {
    /// Defaults: 5 s initial backoff, 60 s cap, 30 s heartbeat.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Reconnecting WebSocket client.
pub struct ReconnectingClient {
    config: ReconnectingClientConfig,
    sink: Mutex<Option<WsSink>>,
    session_id: Mutex<Option<String>>,
}

impl ReconnectingClient {
    /// Create a client; nothing connects until [`run`](Self::run).
    #[must_use]
    pub fn new(config: ReconnectingClientConfig) -> Self {
        Self {
            config,
            sink: Mutex::new(None),
            session_id: Mutex::new(None),
        }
    }

    /// The session id from the last successful handshake.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    /// Send a JSON message over the current connection.
    ///
    /// # Errors
    ///
    /// Returns an error string when disconnected or the write fails.
    pub async fn send(&self, message: &Value) -> Result<(), String> {
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err("not connected".to_string());
        };
        sink.send(Message::Text(message.to_string()))
            .await
            .map_err(|e| e.to_string())
    }

    /// Ask the orchestrator to cancel a request. Best effort when offline.
    pub async fn cancel_request(&self, request_id: &RequestId) {
        let message = json!({"type": "cancel", "request_id": request_id.to_string()});
        if let Err(e) = self.send(&message).await {
            warn!(%request_id, error = %e, "could not send cancel");
        }
    }

    /// Run the connect/listen/reconnect loop until the task is aborted.
    ///
    /// Backoff doubles from the initial delay to the cap and resets after a
    /// successful handshake.
    pub async fn run(self: Arc<Self>, handler: Arc<dyn InboundHandler>) {
        let mut backoff = self.config.initial_backoff;

        loop {
            match self.connect().await {
                Ok(source) => {
                    info!(url = %self.config.url, "connected");
                    backoff = self.config.initial_backoff;

                    let ping = self.spawn_heartbeat();
                    self.listen(source, Arc::clone(&handler)).await;
                    ping.abort();

                    *self.sink.lock().await = None;
                    warn!("connection closed, reconnecting");
                },
                Err(e) => {
                    error!(error = %e, "connection failed");
                },
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.config.max_backoff);
            debug!(next_backoff_secs = backoff.as_secs(), "backoff advanced");
        }
    }

    async fn connect(&self) -> Result<WsSource, String> {
        let (stream, _) = connect_async(&self.config.url)
            .await
            .map_err(|e| e.to_string())?;
        let (sink, mut source) = stream.split();
        *self.sink.lock().await = Some(sink);

        // The server greets with session_start before anything else.
        let handshake = tokio::time::timeout(Duration::from_secs(10), source.next())
            .await
            .map_err(|_| "handshake timed out".to_string())?
            .ok_or_else(|| "socket closed during handshake".to_string())?
            .map_err(|e| e.to_string())?;

        let value: Value = match handshake {
            Message::Text(text) => {
                serde_json::from_str(&text).map_err(|e| e.to_string())?
            },
            other => return Err(format!("unexpected handshake frame: {other:?}")),
        };

        if value.get("type").and_then(Value::as_str) != Some("session_start") {
            return Err(format!("unexpected handshake message: {value}"));
        }
        let session = value
            .get("session_id")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        info!(session = session.as_deref().unwrap_or("?"), "session established");
        *self.session_id.lock().await = session;

        Ok(source)
    }

    fn spawn_heartbeat(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(client.config.ping_interval);
            ticker.tick().await; // skip immediate tick
            loop {
                ticker.tick().await;
                if client.send(&json!({"type": "ping"})).await.is_err() {
                    break;
                }
            }
        })
    }

    async fn listen(&self, mut source: WsSource, handler: Arc<dyn InboundHandler>) {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                    Ok(value) => handler.handle(value).await,
                    Err(e) => warn!(error = %e, "undecodable frame"),
                },
                Ok(Message::Ping(payload)) => {
                    let mut guard = self.sink.lock().await;
                    if let Some(sink) = guard.as_mut() {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {},
                Err(e) => {
                    warn!(error = %e, "socket error");
                    break;
                },
            }
        }
    }
}
