//! Resource ownership registry.
//!
//! Maps a resource path to the one connected client that answers requests
//! for it. The last registrant for a path wins, and every resource owned by a
//! client is dropped together when that client disconnects.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// Identifier of a connected WebSocket client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Thread-safe resource → owner map.
#[derive(Debug)]
pub struct ResourceRegistry {
    owners: RwLock<HashMap<String, ClientId>>,
    /// Bumped on every change; waiters wake on it between polls.
    generation: watch::Sender<u64>,
    poll_interval: Duration,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl ResourceRegistry {
    /// Creates an empty registry whose waits poll at `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            owners: RwLock::new(HashMap::new()),
            generation,
            poll_interval,
        }
    }

    /// Records `client` as the owner of `resource`.
    ///
    /// Returns the previous owner, if another client held the resource.
    pub fn register(&self, resource: impl Into<String>, client: ClientId) -> Option<ClientId> {
        let resource = resource.into();
        let previous = self
            .owners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource.clone(), client);
        info!(%resource, %client, previous = ?previous, "Resource registered");
        self.bump();
        previous
    }

    /// Removes a single resource regardless of its owner.
    pub fn remove(&self, resource: &str) -> Option<ClientId> {
        let removed = self
            .owners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(resource);
        if removed.is_some() {
            debug!(%resource, "Resource removed");
            self.bump();
        }
        removed
    }

    /// Removes every resource owned by `client`, returning them sorted.
    pub fn remove_client(&self, client: ClientId) -> Vec<String> {
        let mut removed = Vec::new();
        self.owners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|resource, owner| {
                if *owner == client {
                    removed.push(resource.clone());
                    false
                } else {
                    true
                }
            });

        if !removed.is_empty() {
            removed.sort();
            info!(%client, resources = ?removed, "Released resources of disconnected client");
            self.bump();
        }
        removed
    }

    /// Returns the current owner of `resource`.
    pub fn owner(&self, resource: &str) -> Option<ClientId> {
        self.owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .copied()
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.owner(resource).is_some()
    }

    /// Lists registered resources in sorted order.
    pub fn resources(&self) -> Vec<String> {
        let mut resources: Vec<String> = self
            .owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        resources.sort();
        resources
    }

    /// Waits until `resource` has an owner or `timeout` elapses.
    ///
    /// Checks at every poll step and also as soon as the registry changes.
    pub async fn wait_for(&self, resource: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut changes = self.generation.subscribe();

        loop {
            if self.contains(resource) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(%resource, ?timeout, "Resource not registered before timeout");
                return false;
            }
            let step = self.poll_interval.min(deadline - now);
            let _ = tokio::time::timeout(step, changes.changed()).await;
        }
    }

    fn bump(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn last_registrant_wins() {
        let registry = ResourceRegistry::default();
        let c1 = ClientId::new(1);
        let c2 = ClientId::new(2);

        assert_eq!(registry.register("/foo", c1), None);
        assert_eq!(registry.register("/foo", c2), Some(c1));
        assert_eq!(registry.owner("/foo"), Some(c2));
    }

    #[test]
    fn remove_client_drops_all_of_its_resources() {
        let registry = ResourceRegistry::default();
        let c1 = ClientId::new(1);
        let c2 = ClientId::new(2);
        registry.register("/b", c1);
        registry.register("/a", c1);
        registry.register("/c", c2);

        assert_eq!(registry.remove_client(c1), vec!["/a".to_string(), "/b".to_string()]);
        assert_eq!(registry.resources(), vec!["/c".to_string()]);
        assert!(registry.remove_client(c1).is_empty());
    }

    #[test]
    fn remove_single_resource() {
        let registry = ResourceRegistry::default();
        registry.register("/foo", ClientId::new(1));
        assert_eq!(registry.remove("/foo"), Some(ClientId::new(1)));
        assert_eq!(registry.remove("/foo"), None);
        assert!(!registry.contains("/foo"));
    }

    #[test]
    fn client_id_display() {
        assert_eq!(ClientId::new(7).to_string(), "client-7");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_times_out_when_never_registered() {
        let registry = ResourceRegistry::default();
        let start = Instant::now();
        assert!(!registry.wait_for("/never", Duration::from_millis(350)).await);
        assert!(start.elapsed() >= Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_sees_late_registration() {
        let registry = Arc::new(ResourceRegistry::default());
        let writer = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            writer.register("/late", ClientId::new(3));
        });

        assert!(registry.wait_for("/late", Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn wait_for_returns_immediately_when_present() {
        let registry = ResourceRegistry::default();
        registry.register("/here", ClientId::new(1));
        assert!(registry.wait_for("/here", Duration::ZERO).await);
    }
}
