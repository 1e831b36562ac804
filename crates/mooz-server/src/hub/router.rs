//! Addressed and broadcast delivery over the registry.

use std::sync::Arc;

use metrics::counter;
use mooz_core::{ClientId, Message};
use tracing::debug;

use super::registry::ClientRegistry;
use crate::metrics::{HUB_MESSAGES_ROUTED_TOTAL, HUB_ROUTING_MISSES_TOTAL};

/// Fire-and-forget delivery to registered clients.
///
/// Enqueues onto endpoints and returns; never waits on a client's writer.
#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<ClientRegistry>,
}

impl MessageRouter {
    /// Create a router over `registry`.
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this router delivers through.
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Deliver `message` to the client registered as `to`.
    ///
    /// Unknown recipients are silently dropped. Returns whether the message
    /// was queued.
    pub async fn send(&self, to: &ClientId, message: Message) -> bool {
        let Some(endpoint) = self.registry.lookup(to).await else {
            debug!(to = %to, message_type = %message.kind, "no such client, dropping message");
            counter!(HUB_ROUTING_MISSES_TOTAL).increment(1);
            return false;
        };
        let queued = endpoint.enqueue(message);
        if queued {
            counter!(HUB_MESSAGES_ROUTED_TOTAL).increment(1);
        }
        queued
    }

    /// Deliver a copy of `message` to every client except `exclude`.
    ///
    /// Returns how many endpoints accepted it.
    pub async fn broadcast(&self, message: &Message, exclude: Option<&ClientId>) -> usize {
        let mut delivered = 0;
        self.registry
            .for_each(exclude, |endpoint| {
                if endpoint.enqueue(message.clone()) {
                    delivered += 1;
                }
            })
            .await;
        counter!(HUB_MESSAGES_ROUTED_TOTAL).increment(delivered as u64);
        debug!(message_type = %message.kind, recipients = delivered, "broadcast");
        delivered
    }
}
