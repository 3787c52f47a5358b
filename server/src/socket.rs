use crate::database::DurableStore;
use crate::managers::state::ServerState;
use anyhow::Result;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use common::envelope::MessageEnvelope;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Live transport handle for delivering envelopes to one connected peer.
///
/// Handles are process-local capabilities owned by the component that also
/// terminates the underlying connection; they are never serialized and
/// never placed in a durable record.
#[async_trait]
pub trait MessageSink: Send + 'static {
    async fn send_envelope(&mut self, envelope: &MessageEnvelope) -> Result<()>;
    fn is_open(&self) -> bool;
}

/// Write half of an accepted websocket. A failed send marks the sink
/// closed, after which relays to it report the recipient offline.
pub struct WebSocketSink {
    sender: SplitSink<WebSocket, Message>,
    open: bool,
}

impl WebSocketSink {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self { sender, open: true }
    }

    pub async fn send_text(&mut self, text: String) -> Result<()> {
        if let Err(error) = self.sender.send(Message::Text(text)).await {
            self.open = false;
            return Err(error.into());
        }
        Ok(())
    }

    pub fn mark_closed(&mut self) {
        self.open = false;
    }
}

#[async_trait]
impl MessageSink for WebSocketSink {
    async fn send_envelope(&mut self, envelope: &MessageEnvelope) -> Result<()> {
        let frame = serde_json::to_string(envelope)?;
        self.send_text(frame).await
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Drives one accepted websocket: registers its write half as the session's
/// transport handle, routes inbound relay frames, and deregisters the
/// session when the socket goes away.
pub async fn handle_socket<S: DurableStore>(
    state: ServerState<S, WebSocketSink>,
    socket: WebSocket,
    session_id: String,
    user_id: Option<String>,
) {
    let (sender, mut receiver) = socket.split();
    let sink = Arc::new(Mutex::new(WebSocketSink::new(sender)));

    {
        let owner = state.sessions.locate(&session_id).await;
        owner
            .lock()
            .await
            .connect(session_id.clone(), user_id.clone(), Some(sink.clone()));
    }
    info!(
        %session_id,
        user = user_id.as_deref().unwrap_or("anonymous"),
        "session connected"
    );

    while let Some(frame) = receiver.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(error) => {
                debug!(%session_id, %error, "websocket receive failed");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                let envelope: MessageEnvelope = match serde_json::from_str(&text) {
                    Ok(envelope) => envelope,
                    Err(error) => {
                        debug!(%session_id, %error, "dropping malformed frame");
                        continue;
                    }
                };
                if !envelope.is_relay() {
                    continue;
                }

                let outcome = state.relay(&envelope).await;
                // Tell the sender whether the envelope reached a live peer
                // or must go through the offline queue instead.
                if let Ok(reply) = serde_json::to_string(&outcome) {
                    let _ = sink.lock().await.send_text(reply).await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let owner = state.sessions.locate(&session_id).await;
        owner.lock().await.disconnect(&session_id);
    }
    sink.lock().await.mark_closed();
    info!(%session_id, "session disconnected");
}
