//! Shared server state and per-connection outboxes

use huepair_auth::{ClosedSession, ConnectionId, SessionStore};
use huepair_core::{Config, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Queue of messages waiting to be written to one WebSocket
pub type Outbox = mpsc::Sender<ServerMessage>;

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Session store shared by all connections
    pub store: Arc<SessionStore>,
    /// Live connections by ID
    connections: RwLock<HashMap<ConnectionId, Outbox>>,
    /// Certificate fingerprint when serving TLS
    pub cert_fingerprint: Option<String>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, store: Arc<SessionStore>, cert_fingerprint: Option<String>) -> Self {
        Self {
            config,
            store,
            connections: RwLock::new(HashMap::new()),
            cert_fingerprint,
        }
    }

    pub async fn register_connection(&self, id: ConnectionId, outbox: Outbox) {
        self.connections.write().await.insert(id, outbox);
        debug!("Registered connection {}", id);
    }

    pub async fn unregister_connection(&self, id: ConnectionId) {
        self.connections.write().await.remove(&id);
        debug!("Unregistered connection {}", id);
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Queue a message for a connection
    ///
    /// Returns false if the connection is gone or its outbox is full.
    pub async fn send_to(&self, id: ConnectionId, message: ServerMessage) -> bool {
        let outbox = self.connections.read().await.get(&id).cloned();
        match outbox {
            Some(tx) => {
                if tx.try_send(message).is_err() {
                    warn!("Dropping message for connection {}: outbox unavailable", id);
                    return false;
                }
                true
            }
            None => {
                debug!("No live connection {}", id);
                false
            }
        }
    }

    /// Tell whichever parties of closed sessions are still connected that
    /// their session is gone
    pub async fn notify_closed(&self, closed: &[ClosedSession], message: &str) {
        for c in closed {
            let parties = std::iter::once(c.session.initiator).chain(c.session.scanner);
            for party in parties {
                self.send_to(party, ServerMessage::error(message)).await;
            }
        }
    }
}
