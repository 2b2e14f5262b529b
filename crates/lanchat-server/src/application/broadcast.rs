//! Broadcaster: fans one message out to every peer except its originator.
//!
//! This use case depends only on the [`PeerSink`] trait and the shared
//! [`PeerRegistry`](super::peer_registry::PeerRegistry).  The TCP-backed
//! implementation lives in `infrastructure::network::peer_connection`; tests
//! inject mocks.
//!
//! # Delivery rules
//!
//! 1. Membership is a point-in-time snapshot taken under the registry lock.
//!    A peer that joins after the snapshot may or may not receive the message.
//! 2. Each recipient encrypts independently (fresh cipher session per send).
//! 3. A failed delivery never aborts the fan-out.  The failing peer is
//!    removed from the registry and closed right after its own failure.
//! 4. The call returns only after every snapshot member has been attempted.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use super::peer_registry::{PeerId, SharedRegistry};

/// Reasons a single delivery can fail.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection was already torn down.
    #[error("peer connection is closed")]
    Closed,
    /// The transport write failed (reset, broken pipe, ...).
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    /// The peer did not accept the bytes in time (it stopped reading).
    #[error("write timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Outbound half of a peer, as seen by the broadcast use case.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeerSink: Send + Sync {
    /// Encrypts `plaintext` and writes it as a single transport write.
    async fn send_encrypted(&self, plaintext: &[u8]) -> Result<(), SendError>;

    /// Tears the connection down.  Returns `true` only for the call that
    /// actually closed it.
    async fn close(&self) -> bool;
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the message was written to.
    pub delivered: Vec<PeerId>,
    /// Peers whose delivery failed.
    pub failed: Vec<PeerId>,
    /// Failed peers this broadcast removed from the registry.  A peer that a
    /// concurrent task had already removed appears in `failed` only.
    pub removed: Vec<PeerId>,
}

/// The broadcast use case.
pub struct Broadcaster<S: ?Sized> {
    peers: SharedRegistry<Arc<S>>,
}

impl<S: PeerSink + ?Sized> Broadcaster<S> {
    pub fn new(peers: SharedRegistry<Arc<S>>) -> Self {
        Self { peers }
    }

    /// Delivers `message` to every registered peer except `origin`.
    pub async fn broadcast(&self, message: &[u8], origin: Option<PeerId>) -> BroadcastReport {
        // Snapshot under the lock, send outside it: a slow peer must not
        // block accepts or removals.
        let targets = self.peers.lock().await.snapshot_except(origin);
        let mut report = BroadcastReport::default();

        for (id, sink) in targets {
            match sink.send_encrypted(message).await {
                Ok(()) => {
                    debug!("delivered {} bytes to peer {id}", message.len());
                    report.delivered.push(id);
                }
                Err(e) => {
                    warn!("delivery to peer {id} failed: {e}");
                    report.failed.push(id);
                    let removed = self.peers.lock().await.remove(id).is_some();
                    sink.close().await;
                    if removed {
                        report.removed.push(id);
                    }
                }
            }
        }

        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
