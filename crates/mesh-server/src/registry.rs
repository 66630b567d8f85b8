//! The node's authoritative set of open connections.

use std::collections::HashMap;
use std::sync::Arc;

use mesh_core::ConnectionId;
use parking_lot::RwLock;

use crate::transport::Connection;

/// Connections keyed by [`ConnectionId`].
///
/// Every read and write goes through one lock, and no lock is held across
/// an `.await`: callers snapshot, then send.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<dyn Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    pub fn insert(&self, connection: Arc<dyn Connection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id().clone(), connection);
    }

    /// Remove a connection, returning it if it was still present.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<dyn Connection>> {
        self.connections.write().remove(id)
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Current members, taken under the lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn Connection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Peer identities of the current members.
    pub fn peers(&self) -> Vec<String> {
        self.connections
            .read()
            .values()
            .map(|c| c.peer().to_owned())
            .collect()
    }

    /// Remove and return every member.
    pub fn drain(&self) -> Vec<Arc<dyn Connection>> {
        self.connections.write().drain().map(|(_, c)| c).collect()
    }
}
