//! Coordinator: the broadcast hub.
//!
//! Owns the listening socket, the peer registry, and the key material of the
//! current run.
//!
//! # Lifecycle
//!
//! ```text
//!  Stopped ──start()──▶ Listening ──stop()──▶ Stopped
//! ```
//!
//! Each `start()` generates fresh key material.  Every accepted connection
//! receives that material (48 raw bytes, see
//! [`send_handshake`](super::peer_connection::send_handshake)) before anything
//! else, is registered, and gets its own read-loop task.  Whatever a peer sends
//! is relayed to every other peer.
//!
//! # Task layout
//!
//! ```text
//!  accept task ──spawns──▶ peer task (read loop) × N
//!       │                        │
//!       │                        └─ on message: Broadcaster::broadcast(origin = self)
//!       └─ returns its JoinSet of peer tasks to stop(), which joins them
//! ```
//!
//! The accept loop waits on `accept()` for at most `accept_poll_interval` at a
//! time so that it notices a stop request promptly.
//!
//! # Stalled peers
//!
//! A peer that stops reading eventually fills its socket buffers.  Writes to
//! it fail after `write_timeout` and the broadcaster evicts it.  `stop()` gives
//! each shutdown notice at most `shutdown_grace`, then closes the peer, which
//! also cancels any relay write still blocked on it.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lanchat_core::protocol::{DEFAULT_PORT, SHUTDOWN_NOTICE};
use lanchat_core::{KeyMaterial, ProtocolError};
use thiserror::Error;
use tokio::net::{tcp::OwnedReadHalf, TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::lan_address::discover_lan_ip;
use super::peer_connection::{send_handshake, InboundHandler, PeerConnection, ReadLoopExit};
use crate::application::broadcast::{BroadcastReport, Broadcaster, PeerSink};
use crate::application::peer_registry::{PeerId, PeerRegistry, SharedRegistry};

/// Capacity of the event channel; slow subscribers lag rather than block.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── Configuration, state, errors, events ──────────────────────────────────────

/// Runtime settings for one coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub bind_addr: SocketAddr,
    pub accept_poll_interval: Duration,
    /// Encrypted and sent to every peer when the coordinator stops.
    pub shutdown_notice: String,
    /// Longest a single write to one peer may block before the peer is
    /// treated as failed.
    pub write_timeout: Duration,
    /// Longest `stop()` waits for a shutdown notice before closing the peer
    /// anyway.
    pub shutdown_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            accept_poll_interval: Duration::from_millis(200),
            shutdown_notice: SHUTDOWN_NOTICE.to_string(),
            write_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Stopped,
    Listening,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("coordinator is already listening")]
    AlreadyRunning,
    #[error("coordinator is not listening")]
    NotRunning,
}

/// Things an operator front end may want to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    Listening {
        local_addr: SocketAddr,
        /// Address peers on the LAN should dial.
        lan_ip: std::net::IpAddr,
    },
    PeerConnected {
        peer_id: PeerId,
        addr: SocketAddr,
    },
    MessageRelayed {
        from: PeerId,
        text: String,
        delivered: usize,
        failed: usize,
    },
    DecodeFailed {
        from: PeerId,
        error: ProtocolError,
    },
    PeerDisconnected {
        peer_id: PeerId,
    },
    Stopped,
}

// ── Shared state ──────────────────────────────────────────────────────────────

/// State shared by the coordinator handle, the accept task, and peer tasks.
struct Shared {
    peers: SharedRegistry<Arc<PeerConnection>>,
    broadcaster: Broadcaster<PeerConnection>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl Shared {
    fn new() -> Self {
        let peers = PeerRegistry::shared();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            broadcaster: Broadcaster::new(Arc::clone(&peers)),
            peers,
            events,
        }
    }

    fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn relay(&self, text: &str, origin: Option<PeerId>) -> BroadcastReport {
        let report = self.broadcaster.broadcast(text.as_bytes(), origin).await;
        for peer_id in &report.removed {
            info!("peer {peer_id} dropped after failed delivery");
            self.emit(CoordinatorEvent::PeerDisconnected { peer_id: *peer_id });
        }
        report
    }

    /// Removes and closes a peer.  Only the call that removes it emits the
    /// disconnect event.
    async fn disconnect(&self, conn: &PeerConnection) {
        let removed = self.peers.lock().await.remove(conn.id()).is_some();
        conn.close().await;
        if removed {
            self.emit(CoordinatorEvent::PeerDisconnected { peer_id: conn.id() });
        }
    }
}

#[async_trait]
impl InboundHandler for Shared {
    async fn on_message(&self, from: PeerId, text: String) {
        debug!("relaying from {from}: {text}");
        let report = self.relay(&text, Some(from)).await;
        self.emit(CoordinatorEvent::MessageRelayed {
            from,
            text,
            delivered: report.delivered.len(),
            failed: report.failed.len(),
        });
    }

    async fn on_decode_error(&self, from: PeerId, error: ProtocolError) {
        warn!("skipping undecodable frame from {from}: {error}");
        self.emit(CoordinatorEvent::DecodeFailed { from, error });
    }
}

// ── Coordinator ───────────────────────────────────────────────────────────────

/// Everything that exists only while listening.
struct RunningState {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    accept_task: JoinHandle<JoinSet<()>>,
}

/// The broadcast hub.  Cheap to share behind an `Arc`.
pub struct Coordinator {
    config: CoordinatorConfig,
    shared: Arc<Shared>,
    /// Held for the whole of `start()` and `stop()`, which serializes them.
    run: Mutex<Option<RunningState>>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::new()),
            run: Mutex::new(None),
        }
    }

    /// Subscribes to coordinator events.  Subscribe before `start()` to see
    /// the `Listening` event.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.shared.events.subscribe()
    }

    pub async fn state(&self) -> CoordinatorState {
        if self.run.lock().await.is_some() {
            CoordinatorState::Listening
        } else {
            CoordinatorState::Stopped
        }
    }

    /// The bound address while listening (useful with port 0).
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.run.lock().await.as_ref().map(|run| run.local_addr)
    }

    pub async fn peer_count(&self) -> usize {
        self.shared.peers.lock().await.len()
    }

    /// Generates key material, binds, and starts accepting peers.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::AlreadyRunning`] if already listening.
    /// - [`CoordinatorError::BindFailed`] if the address cannot be bound.
    pub async fn start(&self) -> Result<SocketAddr, CoordinatorError> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return Err(CoordinatorError::AlreadyRunning);
        }

        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CoordinatorError::BindFailed { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| CoordinatorError::BindFailed { addr, source })?;

        let lan_ip = discover_lan_ip().await;
        info!("Server started... listening on {local_addr} (LAN address {lan_ip})");
        self.shared.emit(CoordinatorEvent::Listening { local_addr, lan_ip });

        let running = Arc::new(AtomicBool::new(true));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            KeyMaterial::generate(),
            Arc::clone(&self.shared),
            Arc::clone(&running),
            self.config.accept_poll_interval,
            self.config.write_timeout,
        ));

        *run = Some(RunningState {
            local_addr,
            running,
            accept_task,
        });
        Ok(local_addr)
    }

    /// Sends `text` to every peer except `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotRunning`] while stopped.
    pub async fn broadcast(
        &self,
        text: &str,
        origin: Option<PeerId>,
    ) -> Result<BroadcastReport, CoordinatorError> {
        if self.state().await != CoordinatorState::Listening {
            return Err(CoordinatorError::NotRunning);
        }
        Ok(self.shared.relay(text, origin).await)
    }

    /// Notifies and disconnects every peer, closes the listener, and joins
    /// every task.  Calling it while stopped is a no-op.
    ///
    /// Notices go out concurrently, each bounded by `shutdown_grace`, so a
    /// peer that stopped reading delays `stop()` by at most that long.
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        let mut run = self.run.lock().await;
        let Some(state) = run.take() else {
            debug!("stop requested while already stopped");
            return Ok(());
        };

        state.running.store(false, Ordering::Release);
        // The accept loop drops the listener on exit, so no peer can be
        // added once this await returns.
        let mut workers = match state.accept_task.await {
            Ok(workers) => workers,
            Err(e) => {
                error!("accept task ended abnormally: {e}");
                JoinSet::new()
            }
        };

        let peers = self.shared.peers.lock().await.drain();
        let notice: Arc<str> = Arc::from(self.config.shutdown_notice.as_str());
        let grace = self.config.shutdown_grace;
        let mut farewells = JoinSet::new();
        for (peer_id, conn) in peers {
            let notice = Arc::clone(&notice);
            farewells.spawn(async move {
                match timeout(grace, conn.send_encrypted(notice.as_bytes())).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!("shutdown notice to {peer_id} not delivered: {e}"),
                    Err(_) => warn!("shutdown notice to {peer_id} timed out after {grace:?}"),
                }
                conn.close().await;
                peer_id
            });
        }
        while let Some(result) = farewells.join_next().await {
            match result {
                Ok(peer_id) => self.shared.emit(CoordinatorEvent::PeerDisconnected { peer_id }),
                Err(e) => warn!("shutdown task ended abnormally: {e}"),
            }
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                warn!("peer task ended abnormally: {e}");
            }
        }

        info!("Server stopped...");
        self.shared.emit(CoordinatorEvent::Stopped);
        Ok(())
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts peers until `running` is cleared, then hands back its peer tasks.
async fn accept_loop(
    listener: TcpListener,
    material: KeyMaterial,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    write_timeout: Duration,
) -> JoinSet<()> {
    let mut workers = JoinSet::new();

    while running.load(Ordering::Acquire) {
        // Reap finished peer tasks so the set does not grow without bound.
        while workers.try_join_next().is_some() {}

        match timeout(poll_interval, listener.accept()).await {
            Ok(Ok((stream, addr))) => {
                let admitted = admit_peer(stream, addr, &material, write_timeout, &shared).await;
                if let Some((conn, reader)) = admitted {
                    workers.spawn(serve_peer(conn, reader, Arc::clone(&shared)));
                }
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            Err(_) => {
                // No connection within the poll interval; re-check the flag.
            }
        }
    }

    info!("accept loop stopped");
    workers
}

/// Sends the handshake and registers the peer.  A failed handshake drops the
/// connection unregistered.
async fn admit_peer(
    mut stream: TcpStream,
    addr: SocketAddr,
    material: &KeyMaterial,
    write_timeout: Duration,
    shared: &Shared,
) -> Option<(Arc<PeerConnection>, OwnedReadHalf)> {
    if let Err(e) = send_handshake(&mut stream, material).await {
        warn!("handshake with {addr} failed: {e}");
        return None;
    }

    let peer_id = Uuid::new_v4();
    let (reader, writer) = stream.into_split();
    let conn = Arc::new(PeerConnection::new(
        peer_id,
        addr,
        material,
        writer,
        write_timeout,
    ));
    shared.peers.lock().await.insert(peer_id, Arc::clone(&conn));

    info!("Connected with {addr} (peer {peer_id})");
    shared.emit(CoordinatorEvent::PeerConnected { peer_id, addr });
    Some((conn, reader))
}

/// One peer's task: run its read loop, then tear it down.
async fn serve_peer(conn: Arc<PeerConnection>, reader: OwnedReadHalf, shared: Arc<Shared>) {
    match conn.read_loop(reader, shared.as_ref()).await {
        ReadLoopExit::RemoteClosed => info!("peer {} ({}) disconnected", conn.id(), conn.addr()),
        ReadLoopExit::Closed => debug!("peer {} closed locally", conn.id()),
        ReadLoopExit::Failed(e) => warn!("peer {} ({}) read failed: {e}", conn.id(), conn.addr()),
    }
    shared.disconnect(&conn).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> CoordinatorConfig {
        CoordinatorConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            accept_poll_interval: Duration::from_millis(20),
            ..CoordinatorConfig::default()
        }
    }

    #[test]
    fn test_default_config_listens_on_all_interfaces_port_5555() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:5555".parse::<SocketAddr>().unwrap());
        assert_eq!(config.accept_poll_interval, Duration::from_millis(200));
        assert_eq!(config.shutdown_notice, "Server is stopping...");
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.shutdown_grace, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_new_coordinator_is_stopped() {
        let coordinator = Coordinator::new(loopback_config());
        assert_eq!(coordinator.state().await, CoordinatorState::Stopped);
        assert_eq!(coordinator.local_addr().await, None);
    }

    #[tokio::test]
    async fn test_start_then_stop_transitions_state() {
        // Arrange
        let coordinator = Coordinator::new(loopback_config());

        // Act
        let addr = coordinator.start().await.unwrap();

        // Assert
        assert_eq!(coordinator.state().await, CoordinatorState::Listening);
        assert_eq!(coordinator.local_addr().await, Some(addr));
        coordinator.stop().await.unwrap();
        assert_eq!(coordinator.state().await, CoordinatorState::Stopped);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let coordinator = Coordinator::new(loopback_config());
        coordinator.start().await.unwrap();

        let second = coordinator.start().await;

        assert!(matches!(second, Err(CoordinatorError::AlreadyRunning)));
        coordinator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_a_no_op() {
        let coordinator = Coordinator::new(loopback_config());
        assert!(coordinator.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_while_stopped_is_rejected() {
        let coordinator = Coordinator::new(loopback_config());
        let result = coordinator.broadcast("op: hello", None).await;
        assert!(matches!(result, Err(CoordinatorError::NotRunning)));
    }

    #[tokio::test]
    async fn test_events_report_start_and_stop() {
        // Arrange
        let coordinator = Coordinator::new(loopback_config());
        let mut events = coordinator.subscribe();

        // Act
        let addr = coordinator.start().await.unwrap();
        coordinator.stop().await.unwrap();

        // Assert
        match events.recv().await.unwrap() {
            CoordinatorEvent::Listening { local_addr, .. } => assert_eq!(local_addr, addr),
            other => panic!("expected Listening, got {other:?}"),
        }
        assert_eq!(events.recv().await.unwrap(), CoordinatorEvent::Stopped);
    }

    #[tokio::test]
    async fn test_coordinator_can_restart_after_stop() {
        let coordinator = Coordinator::new(loopback_config());
        coordinator.start().await.unwrap();
        coordinator.stop().await.unwrap();

        let restarted = coordinator.start().await;

        assert!(restarted.is_ok());
        coordinator.stop().await.unwrap();
    }
}
