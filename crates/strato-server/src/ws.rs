//! Inbound WebSocket chat endpoint.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use strato_core::{ClientEvent, ClientId, RequestId, ThreadId, UserId};
use strato_hub::ConnectionSink;
use strato_queue::QueuedRequest;

/// Outgoing buffer per connection. A client that falls this far behind is
/// dropped; its queued work completes and is delivered on reconnect.
const OUTBOX_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatParams {
    #[serde(default = "default_interface")]
    interface: String,
    user_id: String,
    #[serde(default)]
    token: String,
}

fn default_interface() -> String {
    "web".to_string()
}

/// Sink that forwards hub events into the connection's outbox.
struct WsSink {
    outbox: mpsc::Sender<ClientEvent>,
}

#[async_trait]
impl ConnectionSink for WsSink {
    async fn send(&self, event: &ClientEvent) -> bool {
        // try_send keeps the hub from blocking on a slow client; a full
        // outbox counts as a dead connection.
        match self.outbox.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("client outbox full, dropping connection");
                false
            },
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// `GET /ws/chat?interface=&user_id=&token=`
pub(crate) async fn ws_chat(
    ws: WebSocketUpgrade,
    Query(params): Query<ChatParams>,
    State(app): State<Arc<AppContext>>,
) -> Response {
    let Some(auth) = app.verifier.verify(&params.token, &params.user_id) else {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, app, auth.user_id, params.interface))
}

async fn handle_socket(
    socket: WebSocket,
    app: Arc<AppContext>,
    user_id: UserId,
    interface: String,
) {
    let client_id = ClientId::new(user_id.as_str());
    let session_id = uuid::Uuid::new_v4().to_string();
    let (mut writer, mut reader) = socket.split();

    let (outbox_tx, mut outbox_rx) = mpsc::channel::<ClientEvent>(OUTBOX_CAPACITY);
    app.hub
        .register(client_id.clone(), Arc::new(WsSink { outbox: outbox_tx }));

    // Writer task drains the outbox; the hub never touches the socket.
    let writer_task = tokio::spawn(async move {
        while let Some(event) = outbox_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if writer.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let greeted = app
        .hub
        .send_to_client(
            &client_id,
            &ClientEvent::SessionStart {
                session_id: session_id.clone(),
            },
        )
        .await;
    if !greeted {
        writer_task.abort();
        return;
    }
    info!(client = %client_id, session = %session_id, %interface, "chat session started");

    while let Some(frame) = reader.next().await {
        let message = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let Ok(value) = serde_json::from_str::<Value>(&message) else {
            debug!(client = %client_id, "undecodable frame");
            continue;
        };

        match value.get("type").and_then(Value::as_str) {
            Some("message") => {
                handle_message(&app, &client_id, &user_id, &interface, &value).await;
            },
            Some("cancel") => handle_cancel(&app, &client_id, &value).await,
            Some("answer") => {
                // ask_user response: {type:"answer", request_id, text}
                let request_id = value
                    .get("request_id")
                    .and_then(Value::as_str)
                    .map(RequestId::from_string);
                let text = value.get("text").and_then(Value::as_str).unwrap_or_default();
                if let Some(request_id) = request_id {
                    if !app.hub.answer_question(&request_id, text.to_string()) {
                        debug!(%request_id, "answer with no pending question");
                    }
                }
            },
            Some("ping") => {
                app.hub.send_to_client(&client_id, &ClientEvent::Pong).await;
            },
            other => debug!(?other, "unknown message type"),
        }
    }

    app.hub.unregister(&client_id);
    writer_task.abort();
    info!(client = %client_id, "chat session closed");
}

async fn handle_message(
    app: &Arc<AppContext>,
    client_id: &ClientId,
    user_id: &UserId,
    interface: &str,
    value: &Value,
) {
    let text = value.get("message").and_then(Value::as_str).unwrap_or_default();
    let thread_id = value
        .get("thread_id")
        .and_then(Value::as_str)
        .unwrap_or("default");

    let mut request = QueuedRequest::new(user_id.clone(), ThreadId::new(thread_id), text);
    request.message_id = value
        .get("message_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    request.channel_id = value
        .get("channel_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    request.bot_id = Some(client_id.clone());
    request.interface = interface.to_string();
    request.model = value
        .get("model")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    request.temperature = value.get("temperature").and_then(Value::as_f64);
    request.thinking_enabled = value.get("thinking_enabled").and_then(Value::as_bool);
    if let Some(refs) = value.get("file_refs") {
        if let Ok(file_refs) = serde_json::from_value(refs.clone()) {
            request.file_refs = file_refs;
        }
    }

    match app.submit(request).await {
        Ok((request, position)) => {
            app.hub
                .send_to_client(
                    client_id,
                    &ClientEvent::Queued {
                        request_id: request.request_id.clone(),
                        queue_position: position,
                    },
                )
                .await;
            if app.maintenance_mode() == strato_config::MaintenanceMode::Soft {
                app.hub
                    .send_to_client(
                        client_id,
                        &ClientEvent::MaintenanceWarning {
                            message: app.settings.maintenance_message.clone(),
                        },
                    )
                    .await;
            }
        },
        Err(error) => {
            app.hub
                .send_to_client(
                    client_id,
                    &ClientEvent::Failed {
                        request_id: RequestId::new(),
                        error: error.to_string(),
                        attempts: 0,
                    },
                )
                .await;
        },
    }
}

async fn handle_cancel(app: &Arc<AppContext>, client_id: &ClientId, value: &Value) {
    let Some(request_id) = value
        .get("request_id")
        .and_then(Value::as_str)
        .map(RequestId::from_string)
    else {
        return;
    };

    let cancelled = app.cancel_request(&request_id).await;
    if cancelled {
        app.hub
            .send_to_client(
                client_id,
                &ClientEvent::Cancelled {
                    request_id: request_id.clone(),
                },
            )
            .await;
        info!(%request_id, "cancelled by client");
    } else {
        app.hub
            .send_to_client(
                client_id,
                &ClientEvent::Failed {
                    request_id,
                    error: "nothing to cancel".to_string(),
                    attempts: 0,
                },
            )
            .await;
    }
}
