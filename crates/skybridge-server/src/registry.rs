use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use skybridge_core::{ClientId, CommandFrame};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("client {0} is already connected")]
    Conflict(ClientId),
}

/// A live session: where to push outbound frames for one client.
pub struct Connection {
    pub client_id: ClientId,
    pub tx: mpsc::Sender<CommandFrame>,
    pub connected_at: DateTime<Utc>,
}

/// Registry of live sessions keyed by client id. The only state shared
/// between session tasks and the consumer loop.
pub struct ConnectionRegistry {
    connections: DashMap<ClientId, Connection>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a live session and return the receiving end of its
    /// outbound channel. Fails when the id is already connected:
    /// reconnecting callers must unregister first or use a fresh id.
    pub fn register(&self, client_id: ClientId) -> Result<mpsc::Receiver<CommandFrame>, RegistryError> {
        match self.connections.entry(client_id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::Conflict(client_id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(self.max_send_queue);
                slot.insert(Connection {
                    client_id,
                    tx,
                    connected_at: Utc::now(),
                });
                Ok(rx)
            }
        }
    }

    /// Idempotent removal; absent ids are a no-op.
    pub fn unregister(&self, client_id: &ClientId) {
        self.connections.remove(client_id);
    }

    /// Clone the outbound sender for a client, if connected. Never blocks.
    pub fn lookup(&self, client_id: &ClientId) -> Option<mpsc::Sender<CommandFrame>> {
        self.connections.get(client_id).map(|conn| conn.tx.clone())
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}
