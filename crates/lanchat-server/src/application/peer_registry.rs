//! PeerRegistry: the coordinator's set of live peer connections.
//!
//! The registry is the one piece of state mutated from several tasks at once:
//!
//! - the accept loop **inserts** a peer once its handshake has been written,
//! - any peer's read loop or a failed broadcast delivery **removes** it,
//! - every broadcast takes a **snapshot** to iterate over.
//!
//! The registry itself is a plain single-threaded map.  The coordinator keeps
//! it behind one `tokio::sync::Mutex` (see [`SharedRegistry`]) so that all
//! three operations are mutually exclusive.  Broadcasts iterate over a cloned
//! snapshot taken under the lock, never over the live map, so a concurrent
//! removal can neither be half-observed nor cause a peer to be skipped or
//! visited twice.
//!
//! # Peer lifecycle
//!
//! ```text
//! accept ──► handshake written ──► insert ──► … ──► remove (exactly once)
//! ```
//!
//! `remove` returns the handle only to the first caller, which is how the
//! coordinator guarantees that each disconnect is reported once.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

/// Identity of a peer within one coordinator run.
///
/// Only meaningful while the connection is alive; a reconnecting peer gets a
/// new identifier.
pub type PeerId = Uuid;

/// The registry as shared between the coordinator's tasks.
pub type SharedRegistry<T> = Arc<Mutex<PeerRegistry<T>>>;

/// In-memory set of live peers, keyed by [`PeerId`].
///
/// `T` is the per-peer handle: `Arc<PeerConnection>` in production,
/// `Arc<dyn PeerSink>` mocks in tests.
pub struct PeerRegistry<T> {
    peers: HashMap<PeerId, T>,
}

impl<T> Default for PeerRegistry<T> {
    fn default() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }
}

impl<T: Clone> PeerRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a fresh registry for sharing between tasks.
    pub fn shared() -> SharedRegistry<T> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Adds a peer.  Returns `false` if the identifier was already present,
    /// in which case the previous handle is replaced.
    pub fn insert(&mut self, id: PeerId, handle: T) -> bool {
        self.peers.insert(id, handle).is_none()
    }

    /// Removes a peer, returning its handle to the first caller only.
    pub fn remove(&mut self, id: PeerId) -> Option<T> {
        self.peers.remove(&id)
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Point-in-time copy of every peer except `origin`.
    pub fn snapshot_except(&self, origin: Option<PeerId>) -> Vec<(PeerId, T)> {
        self.peers
            .iter()
            .filter(|(id, _)| Some(**id) != origin)
            .map(|(id, handle)| (*id, handle.clone()))
            .collect()
    }

    /// Removes and returns every peer.  Used on shutdown.
    pub fn drain(&mut self) -> Vec<(PeerId, T)> {
        self.peers.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(n: usize) -> (PeerRegistry<&'static str>, Vec<PeerId>) {
        let mut registry = PeerRegistry::new();
        let ids: Vec<PeerId> = (0..n).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            registry.insert(*id, "peer");
        }
        (registry, ids)
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry: PeerRegistry<u8> = PeerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_insert_adds_peer() {
        let (registry, ids) = registry_with(1);
        assert!(registry.contains(ids[0]));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insert_reports_replacement_of_existing_id() {
        let mut registry = PeerRegistry::new();
        let id = Uuid::new_v4();
        assert!(registry.insert(id, 1));
        assert!(!registry.insert(id, 2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_returns_handle_only_once() {
        // Arrange
        let (mut registry, ids) = registry_with(2);

        // Act
        let first = registry.remove(ids[0]);
        let second = registry.remove(ids[0]);

        // Assert
        assert_eq!(first, Some("peer"));
        assert_eq!(second, None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_except_excludes_origin() {
        let (registry, ids) = registry_with(4);
        let snapshot = registry.snapshot_except(Some(ids[2]));

        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.iter().all(|(id, _)| *id != ids[2]));
    }

    #[test]
    fn test_snapshot_without_origin_includes_everyone() {
        let (registry, _) = registry_with(3);
        assert_eq!(registry.snapshot_except(None).len(), 3);
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_removal() {
        // A broadcast in progress keeps its own copy of the membership.
        let (mut registry, ids) = registry_with(3);
        let snapshot = registry.snapshot_except(None);

        registry.remove(ids[1]);

        assert_eq!(snapshot.len(), 3);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_snapshot_contains_no_duplicates() {
        let (registry, _) = registry_with(5);
        let mut seen: Vec<PeerId> = registry
            .snapshot_except(None)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_drain_empties_registry() {
        let (mut registry, ids) = registry_with(3);
        let drained = registry.drain();

        assert_eq!(drained.len(), 3);
        assert!(registry.is_empty());
        assert!(ids.iter().all(|id| !registry.contains(*id)));
    }

    #[tokio::test]
    async fn test_shared_registry_serialises_concurrent_inserts() {
        let shared: SharedRegistry<u32> = PeerRegistry::shared();
        let mut handles = Vec::new();
        for n in 0..32u32 {
            let shared = Arc::clone(&shared);
            handles.push(tokio::spawn(async move {
                shared.lock().await.insert(Uuid::new_v4(), n);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(shared.lock().await.len(), 32);
    }
}
