//! Directory of connected clients.

use std::collections::HashMap;
use std::sync::Arc;

use mooz_core::ClientId;
use tokio::sync::RwLock;
use tracing::warn;

use super::endpoint::ClientEndpoint;

/// Maps client ids to their outbound endpoints.
///
/// Lookups and iteration share the read lock; register/unregister take the
/// write lock. Work done under the read lock must not block (endpoints only
/// `try_send`).
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, Arc<ClientEndpoint>>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Insert an endpoint under its id, replacing any previous entry.
    pub async fn register(&self, endpoint: Arc<ClientEndpoint>) {
        let mut clients = self.clients.write().await;
        if let Some(previous) = clients.insert(endpoint.id().clone(), endpoint) {
            warn!(client_id = %previous.id(), "client id registered twice, replaced");
        }
    }

    /// Remove a client. Returns `false` if it was not registered.
    pub async fn unregister(&self, id: &ClientId) -> bool {
        self.clients.write().await.remove(id).is_some()
    }

    /// Find a client's endpoint.
    pub async fn lookup(&self, id: &ClientId) -> Option<Arc<ClientEndpoint>> {
        self.clients.read().await.get(id).cloned()
    }

    /// Call `f` for every registered endpoint except `exclude`.
    pub async fn for_each<F>(&self, exclude: Option<&ClientId>, mut f: F)
    where
        F: FnMut(&ClientEndpoint),
    {
        let clients = self.clients.read().await;
        for (id, endpoint) in clients.iter() {
            if Some(id) == exclude {
                continue;
            }
            f(endpoint);
        }
    }

    /// Number of registered clients.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether no client is registered.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Ids of all registered clients, sorted.
    pub async fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.clients.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
