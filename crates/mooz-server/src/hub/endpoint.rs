//! Outbound endpoint of one connected client.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use mooz_core::{ClientId, Message};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::metrics::HUB_DROPPED_MESSAGES_TOTAL;

/// The addressable half of a client: a bounded FIFO queue drained by the
/// session's writer role.
///
/// The session owns the endpoint; the registry only keeps an `Arc` to it
/// between register and unregister.
pub struct ClientEndpoint {
    id: ClientId,
    tx: mpsc::Sender<Message>,
    dropped_messages: AtomicU64,
}

impl ClientEndpoint {
    /// Create an endpoint and the receiver its writer drains.
    pub fn channel(id: ClientId, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(id, tx)), rx)
    }

    /// Wrap an existing sender.
    pub fn new(id: ClientId, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            tx,
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// The client this endpoint delivers to.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Queue a message without waiting.
    ///
    /// Returns `false` if the queue is full or its writer is gone; the
    /// message is then dropped and counted. Never blocks, so it is safe to
    /// call while holding the registry lock.
    pub fn enqueue(&self, message: Message) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(
                    client_id = %self.id,
                    message_type = %message.kind,
                    "send queue full, dropping message"
                );
                self.record_drop();
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                debug!(
                    client_id = %self.id,
                    message_type = %message.kind,
                    "writer gone, dropping message"
                );
                self.record_drop();
                false
            }
        }
    }

    fn record_drop(&self) {
        let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        counter!(HUB_DROPPED_MESSAGES_TOTAL).increment(1);
    }

    /// Total messages dropped for this endpoint.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ClientEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEndpoint")
            .field("id", &self.id)
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mooz_core::MessageType;

    fn make_endpoint(capacity: usize) -> (Arc<ClientEndpoint>, mpsc::Receiver<Message>) {
        ClientEndpoint::channel(ClientId::from("client_1"), capacity)
    }

    #[tokio::test]
    async fn enqueue_success() {
        let (ep, mut rx) = make_endpoint(8);
        assert!(ep.enqueue(Message::new("chat")));
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, MessageType::Custom("chat".into()));
        assert_eq!(ep.drop_count(), 0);
    }

    #[tokio::test]
    async fn enqueue_to_full_queue_drops() {
        let (ep, _rx) = make_endpoint(1);
        assert!(ep.enqueue(Message::new("first")));
        assert!(!ep.enqueue(Message::new("second")));
        assert_eq!(ep.drop_count(), 1);
    }

    #[tokio::test]
    async fn enqueue_to_closed_queue_drops() {
        let (ep, rx) = make_endpoint(8);
        drop(rx);
        assert!(!ep.enqueue(Message::new("late")));
        assert_eq!(ep.drop_count(), 1);
    }

    #[tokio::test]
    async fn queue_is_fifo() {
        let (ep, mut rx) = make_endpoint(8);
        for i in 0..5 {
            assert!(ep.enqueue(Message::new("seq").with_data(i)));
        }
        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.data, Some(serde_json::json!(i)));
        }
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (ep, _rx) = make_endpoint(0);
        assert!(ep.enqueue(Message::new("one")));
    }
}
