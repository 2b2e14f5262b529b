//! PeerConnection: one accepted TCP connection and its read loop.
//!
//! The TCP stream is split into two owned halves:
//!
//! - The **write half** lives inside the `PeerConnection` behind an async
//!   mutex, so concurrent broadcasts to the same peer never interleave bytes.
//!   Every write is bounded by the connection's write timeout and is cancelled
//!   by [`PeerSink::close`], so a peer that stops reading cannot pin the lock.
//! - The **read half** is handed to [`PeerConnection::read_loop`], which runs in
//!   the peer's own Tokio task.
//!
//! # Framing limitation
//!
//! There is no length prefix on the wire.  Every non-empty `read()` of up to
//! [`READ_BUFFER_SIZE`] bytes is treated as exactly one encrypted message.
//! This holds in practice because chat lines are short and each one is sent as a
//! single write, but two messages coalesced into one read (or one message
//! split across reads) decrypt to garbage.  Such frames surface as
//! [`ProtocolError::InvalidUtf8`] through [`InboundHandler::on_decode_error`]
//! and the loop keeps running.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lanchat_core::protocol::READ_BUFFER_SIZE;
use lanchat_core::{decode_text, CipherSession, KeyMaterial, ProtocolError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::debug;

use crate::application::broadcast::{PeerSink, SendError};
use crate::application::peer_registry::PeerId;

/// Receives what a peer's read loop decodes.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Called once per successfully decoded message, in read order.
    async fn on_message(&self, from: PeerId, text: String);

    /// Called when a read decrypts to bytes that are not valid UTF-8.
    async fn on_decode_error(&self, from: PeerId, error: ProtocolError);
}

/// Why a read loop returned.
#[derive(Debug)]
pub enum ReadLoopExit {
    /// The remote end closed its side (zero-length read).
    RemoteClosed,
    /// [`PeerSink::close`] was called locally.
    Closed,
    /// The transport reported an error.
    Failed(std::io::Error),
}

/// Writes the 48-byte key/IV handshake as the very first bytes of `stream`.
///
/// # Errors
///
/// Returns the transport error if the write fails; the caller drops the
/// connection without registering it.
pub async fn send_handshake(
    stream: &mut TcpStream,
    material: &KeyMaterial,
) -> std::io::Result<()> {
    stream.write_all(&material.to_handshake_bytes()).await
}

/// A live peer as seen by the coordinator.
pub struct PeerConnection {
    id: PeerId,
    addr: SocketAddr,
    cipher: CipherSession,
    write_timeout: Duration,
    /// `None` once the connection has been closed.
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: AtomicBool,
    /// Flipped to `true` by `close()`; the read loop and in-flight sends
    /// watch it.
    shutdown_tx: watch::Sender<bool>,
}

impl PeerConnection {
    pub fn new(
        id: PeerId,
        addr: SocketAddr,
        material: &KeyMaterial,
        writer: OwnedWriteHalf,
        write_timeout: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            id,
            addr,
            cipher: material.cipher(),
            write_timeout,
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Reads, decrypts, and dispatches messages until the connection ends.
    ///
    /// Returns when the remote end closes, the transport fails, or
    /// [`PeerSink::close`] is called on this connection.  Teardown (registry
    /// removal and `close`) is the caller's job.
    pub async fn read_loop(
        &self,
        mut reader: OwnedReadHalf,
        handler: &dyn InboundHandler,
    ) -> ReadLoopExit {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            // The flag only ever goes false -> true, so any change means closed.
            if *shutdown_rx.borrow_and_update() {
                return ReadLoopExit::Closed;
            }
            let n = tokio::select! {
                result = reader.read(&mut buf) => match result {
                    Ok(0) => return ReadLoopExit::RemoteClosed,
                    Ok(n) => n,
                    Err(e) => return ReadLoopExit::Failed(e),
                },
                _ = shutdown_rx.changed() => return ReadLoopExit::Closed,
            };

            let plaintext = self.cipher.decrypt(&buf[..n]);
            match decode_text(plaintext) {
                Ok(text) => {
                    debug!("peer {} sent {n} bytes", self.id);
                    handler.on_message(self.id, text).await;
                }
                Err(e) => handler.on_decode_error(self.id, e).await,
            }
        }
    }
}

#[async_trait]
impl PeerSink for PeerConnection {
    async fn send_encrypted(&self, plaintext: &[u8]) -> Result<(), SendError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return Err(SendError::Closed);
        }

        let ciphertext = self.cipher.encrypt(plaintext);
        let write = async {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or(SendError::Closed)?;
            writer.write_all(&ciphertext).await?;
            Ok::<(), SendError>(())
        };

        // Dropping `write` releases the writer lock.  A cancelled write may
        // leave a partial frame on the wire, so callers close the peer on any
        // error.
        tokio::select! {
            result = timeout(self.write_timeout, write) => match result {
                Ok(written) => written,
                Err(_) => Err(SendError::TimedOut(self.write_timeout)),
            },
            _ = shutdown_rx.changed() => Err(SendError::Closed),
        }
    }

    async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Wake the read loop and cancel any in-flight send before waiting on
        // the writer lock, which that send holds.
        self.shutdown_tx.send_replace(true);
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("peer {} ({}) shutdown: {e}", self.id, self.addr);
            }
        }
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
