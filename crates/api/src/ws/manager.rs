use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use reface_core::types::Timestamp;
use tokio::sync::{mpsc, RwLock};

/// Outbound half of a subscriber's event channel.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// One client of the job-event feed.
pub struct WsConnection {
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Job-event subscribers keyed by connection id.
///
/// Shared behind an `Arc` by the upgrade handler, the heartbeat and every
/// worker that publishes events. Fan-out only takes the read lock; a
/// subscriber whose channel has closed is pruned after the send.
#[derive(Default)]
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `conn_id`; the returned receiver yields every event sent
    /// from now on.
    pub async fn add(&self, conn_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (sender, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            sender,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            let seconds = (chrono::Utc::now() - conn.connected_at).num_seconds();
            tracing::debug!(conn_id, seconds, "Subscriber removed");
        }
    }

    /// Send `message` to every subscriber.
    pub async fn broadcast(&self, message: Message) {
        self.send_all(message).await;
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every subscriber and forget them all.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Heartbeat ping; also prunes subscribers that went away quietly.
    pub async fn ping_all(&self) {
        self.send_all(Message::Ping(Bytes::new())).await;
    }

    async fn send_all(&self, message: Message) {
        let closed: Vec<String> = {
            let conns = self.connections.read().await;
            conns
                .iter()
                .filter(|(_, conn)| conn.sender.send(message.clone()).is_err())
                .map(|(id, _)| id.clone())
                .collect()
        };
        if closed.is_empty() {
            return;
        }

        let mut conns = self.connections.write().await;
        for id in &closed {
            conns.remove(id);
        }
        tracing::debug!(pruned = closed.len(), "Dropped closed subscribers");
    }
}
