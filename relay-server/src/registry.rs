// relay-server/src/registry.rs
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Failure to hand a frame to the transport
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("connection is closed")]
    Closed,
    #[error("transport rejected frame: {0}")]
    Rejected(String),
}

/// Write side of one realtime connection
pub trait ClientSocket: Send + Sync {
    /// Whether the connection can still accept frames
    fn is_open(&self) -> bool;

    fn send_text(&self, text: String) -> Result<(), SocketError>;
}

/// One accepted realtime connection
#[derive(Clone)]
pub struct ClientConnection {
    pub id: String,
    pub socket: Arc<dyn ClientSocket>,
    pub connected_at: DateTime<Utc>,
}

impl ClientConnection {
    pub fn new(id: String, socket: impl ClientSocket + 'static) -> Self {
        Self {
            id,
            socket: Arc::new(socket),
            connected_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("open", &self.socket.is_open())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

#[derive(Default)]
struct RegistryInner {
    connections: DashMap<String, ClientConnection>,
    next_id: AtomicU64,
}

/// Process-wide table of live connections keyed by client id.
///
/// Cloning is cheap and every clone sees the same table; `main` builds one
/// and hands it to both the WebSocket acceptor and the HTTP api.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id that has never been handed out by this registry
    pub fn next_client_id(&self) -> String {
        let n = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("client_{}", n)
    }

    pub fn register(&self, connection: ClientConnection) {
        let id = connection.id.clone();
        if self.inner.connections.insert(id.clone(), connection).is_some() {
            tracing::warn!("Replaced existing connection for client: {}", id);
        }
        tracing::debug!("Registered client: {} ({} total clients)", id, self.len());
    }

    /// Remove a connection; removing an unknown id is not an error
    pub fn unregister(&self, client_id: &str) -> bool {
        let removed = self.inner.connections.remove(client_id).is_some();
        if removed {
            tracing::debug!("Unregistered client: {} ({} total clients)", client_id, self.len());
        }
        removed
    }

    /// Look up a connection; the entry is cloned so no map guard outlives the call
    pub fn find(&self, client_id: &str) -> Option<ClientConnection> {
        self.inner
            .connections
            .get(client_id)
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.connections.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}
