//! Transport termination over an axum WebSocket. Everything upstream of this module
//! (`auralis-stream::Transport`) is transport-agnostic; this is the only
//! place in the workspace that knows the wire is a WebSocket.

use async_trait::async_trait;
use auralis_stream::{OutboundMessage, Transport};
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Owns the outbound half of a socket. `send` pushes onto a bounded channel
/// drained by a dedicated task (`spawn_sender`) rather than writing the
/// socket directly, so a slow client can't block the session loop.
pub struct WsTransport {
    tx: mpsc::Sender<Message>,
    connected: Arc<AtomicBool>,
}

impl WsTransport {
    pub fn new(tx: mpsc::Sender<Message>, connected: Arc<AtomicBool>) -> Self {
        Self { tx, connected }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, msg: OutboundMessage) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        let text = match serde_json::to_string(&msg) {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, "failed to serialize outbound message");
                return false;
            }
        };
        if self.tx.send(Message::Text(text.into())).await.is_err() {
            self.connected.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Drains `rx` onto the socket's write half until it closes or the channel
/// is dropped. Runs as its own task for the lifetime of the connection.
pub async fn spawn_sender(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg) = rx.recv().await {
        if sink.send(msg).await.is_err() {
            connected.store(false, Ordering::SeqCst);
            break;
        }
    }
    connected.store(false, Ordering::SeqCst);
    let _ = sink.close().await;
}

/// Scopes a shared [`WsTransport`] to one logical session: `is_connected`
/// additionally reflects a per-session cancellation flag so a `seek` or
/// `preset_change` can retire the current stream loop without tearing down
/// the socket underneath it.
pub struct SessionTransport {
    inner: Arc<WsTransport>,
    active: Arc<AtomicBool>,
}

impl SessionTransport {
    pub fn new(inner: Arc<WsTransport>, active: Arc<AtomicBool>) -> Self {
        Self { inner, active }
    }
}

#[async_trait]
impl Transport for SessionTransport {
    async fn send(&self, msg: OutboundMessage) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        self.inner.send(msg).await
    }

    fn is_connected(&self) -> bool {
        self.active.load(Ordering::SeqCst) && self.inner.is_connected()
    }
}
