//! Table of connected clients and their outbound queues.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::registry::ClientId;

/// Sender half feeding a client's WebSocket writer task.
pub type Outbound = mpsc::UnboundedSender<Message>;

/// Connected clients, keyed by [`ClientId`].
#[derive(Debug)]
pub struct ClientTable {
    next_id: AtomicU64,
    clients: RwLock<HashMap<ClientId, Outbound>>,
    connected: watch::Sender<usize>,
}

impl Default for ClientTable {
    fn default() -> Self {
        let (connected, _) = watch::channel(0);
        Self {
            next_id: AtomicU64::new(1),
            clients: RwLock::new(HashMap::new()),
            connected,
        }
    }
}

impl ClientTable {
    /// Adds a client and returns its freshly assigned id.
    pub fn connect(&self, outbound: Outbound) -> ClientId {
        let id = ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let count = {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            clients.insert(id, outbound);
            clients.len()
        };
        self.connected.send_replace(count);
        debug!(client = %id, count, "Client connected");
        id
    }

    /// Removes a client. Returns false if it was not connected.
    pub fn disconnect(&self, id: ClientId) -> bool {
        let (removed, count) = {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            let removed = clients.remove(&id).is_some();
            (removed, clients.len())
        };
        if removed {
            self.connected.send_replace(count);
            debug!(client = %id, count, "Client disconnected");
        }
        removed
    }

    /// Queues `text` for one client. Returns false if the client is gone.
    pub fn send_to(&self, id: ClientId, text: impl Into<String>) -> bool {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        match clients.get(&id) {
            Some(outbound) => outbound.send(Message::Text(text.into())).is_ok(),
            None => {
                warn!(client = %id, "Dropping message for unknown client");
                false
            }
        }
    }

    /// Queues `text` for every connected client; returns how many accepted it.
    pub fn broadcast(&self, text: &str) -> usize {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        clients
            .values()
            .filter(|outbound| outbound.send(Message::Text(text.to_string())).is_ok())
            .count()
    }

    /// Connected client ids in ascending order.
    pub fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        *self.connected.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until at least one client is connected.
    pub async fn wait_for_client(&self, timeout: Duration) -> bool {
        let mut rx = self.connected.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|count| *count > 0)).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn text(message: Message) -> String {
        match message {
            Message::Text(text) => text,
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn ids_are_unique_and_sorted() {
        let table = ClientTable::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = table.connect(tx.clone());
        let b = table.connect(tx);
        assert_ne!(a, b);
        assert_eq!(table.ids(), vec![a, b]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn broadcast_reaches_only_connected_clients() {
        let table = ClientTable::default();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let c1 = table.connect(tx1);
        let _c2 = table.connect(tx2);

        assert!(table.disconnect(c1));
        assert_eq!(table.broadcast("hello"), 1);

        assert!(rx1.try_recv().is_err());
        assert_eq!(text(rx2.try_recv().unwrap()), "hello");
    }

    #[test]
    fn send_to_unknown_client_fails() {
        let table = ClientTable::default();
        assert!(!table.send_to(ClientId::new(99), "x"));
        assert!(!table.disconnect(ClientId::new(99)));
    }

    #[tokio::test]
    async fn wait_for_client_wakes_on_connect() {
        let table = Arc::new(ClientTable::default());
        assert!(!table.wait_for_client(Duration::from_millis(10)).await);

        let writer = table.clone();
        tokio::spawn(async move {
            let (tx, _rx) = mpsc::unbounded_channel();
            writer.connect(tx);
        });
        assert!(table.wait_for_client(Duration::from_secs(1)).await);
    }
}
