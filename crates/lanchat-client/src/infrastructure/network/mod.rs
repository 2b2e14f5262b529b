//! Network infrastructure for the client: the chat session.
//!
//! Architecture:
//! - [`ClientSession`] owns the TCP stream to the coordinator.
//! - `connect` reads the 48-byte key handshake, then spawns one background read
//!   loop that decrypts inbound messages and forwards them as
//!   [`SessionEvent`]s on an `mpsc` channel.
//! - `send` encrypts `"<nickname>: <text>"` and writes it as a single write.
//!
//! # State machine
//!
//! ```text
//!  Disconnected ──connect()──▶ Connecting ──handshake ok──▶ Connected
//!       ▲                          │                            │
//!       └──────── failure ─────────┘          disconnect() / remote close /
//!       └───────────────────────────────────── read error / `{quit}` sent
//! ```
//!
//! # Framing limitation
//!
//! Like the coordinator, the client treats every non-empty read of up to 1024
//! bytes as exactly one encrypted message.  Frames that do not decode as UTF-8
//! surface as [`SessionEvent::DecodeError`].

pub mod handshake;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lanchat_core::protocol::READ_BUFFER_SIZE;
use lanchat_core::{decode_text, ChatMessage, CipherSession, ProtocolError};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{tcp::OwnedReadHalf, tcp::OwnedWriteHalf, TcpStream},
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

pub use handshake::{read_key_material, HandshakeError};

/// Capacity of the inbound event queue.
const EVENT_QUEUE_CAPACITY: usize = 128;

/// Errors surfaced to the caller of [`ClientSession`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connection to the coordinator failed.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The key handshake did not complete.
    #[error("handshake with {addr} failed: {source}")]
    Handshake {
        addr: SocketAddr,
        #[source]
        source: HandshakeError,
    },

    #[error("session is already connected")]
    AlreadyConnected,

    #[error("session is not connected")]
    NotConnected,

    /// The message cannot be sent as one frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The write failed; the session is now disconnected.
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for a chat session.
#[derive(Debug, Clone)]
pub struct ClientSessionConfig {
    /// Prefixed to every outgoing line as `"<nickname>: "`.
    pub nickname: String,
    /// Upper bound on waiting for the 48 handshake bytes.
    pub handshake_timeout: Duration,
}

impl Default for ClientSessionConfig {
    fn default() -> Self {
        Self {
            nickname: "guest".to_string(),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Why the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called, or `{quit}` was sent.
    Local,
    /// The coordinator closed the connection.
    RemoteClosed,
    /// A read or write failed.
    Failed(String),
}

/// Delivered by the read loop, one per inbound read, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A decrypted line, e.g. `"bob: hi"` or `"Server is stopping..."`.
    Message(String),
    /// A frame that did not decode; the session stays connected.
    DecodeError(ProtocolError),
    /// The last event of a session.
    ///
    /// Dropped only when the queue is full at the moment of a local
    /// `disconnect()`.
    Disconnected(DisconnectReason),
}

/// The live half of a connected session.
struct Link {
    /// Distinguishes this connection from later ones on the same session.
    generation: u64,
    writer: OwnedWriteHalf,
    cipher: CipherSession,
    shutdown_tx: watch::Sender<bool>,
    reader_task: JoinHandle<()>,
}

/// A client's connection to the coordinator.
pub struct ClientSession {
    config: ClientSessionConfig,
    link: Arc<Mutex<Option<Link>>>,
    state: Arc<watch::Sender<SessionState>>,
    generations: AtomicU64,
}

impl ClientSession {
    pub fn new(config: ClientSessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            link: Arc::new(Mutex::new(None)),
            state: Arc::new(state),
            generations: AtomicU64::new(0),
        }
    }

    pub fn nickname(&self) -> &str {
        &self.config.nickname
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observes state changes, e.g. to wait for a remote close.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Connects, completes the key handshake, and starts the read loop.
    ///
    /// Returns the queue on which inbound messages arrive.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AlreadyConnected`] if a connection is live.
    /// - [`ClientError::ConnectFailed`] if the TCP connect fails.
    /// - [`ClientError::Handshake`] if the key/IV are not received in full
    ///   within the handshake timeout.
    ///
    /// On any error the session is left `Disconnected`.
    pub async fn connect(
        &self,
        addr: SocketAddr,
    ) -> Result<mpsc::Receiver<SessionEvent>, ClientError> {
        let mut link = self.link.lock().await;
        if link.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        self.state.send_replace(SessionState::Connecting);
        let (stream, cipher) = match self.establish(addr).await {
            Ok(established) => established,
            Err(e) => {
                self.state.send_replace(SessionState::Disconnected);
                return Err(e);
            }
        };

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = stream.into_split();
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader_task = tokio::spawn(read_loop(ReadLoop {
            generation,
            reader,
            cipher: cipher.clone(),
            events: events_tx,
            shutdown: shutdown_rx,
            link: Arc::clone(&self.link),
            state: Arc::clone(&self.state),
        }));

        *link = Some(Link {
            generation,
            writer,
            cipher,
            shutdown_tx,
            reader_task,
        });
        self.state.send_replace(SessionState::Connected);
        info!("connected to {addr}");
        Ok(events_rx)
    }

    async fn establish(&self, addr: SocketAddr) -> Result<(TcpStream, CipherSession), ClientError> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::ConnectFailed { addr, source })?;

        let material = timeout(self.config.handshake_timeout, read_key_material(&mut stream))
            .await
            .map_err(|_| HandshakeError::TimedOut)
            .and_then(|result| result)
            .map_err(|source| ClientError::Handshake { addr, source })?;

        debug!("received session key from {addr}");
        Ok((stream, material.cipher()))
    }

    /// Sends `text` as `"<nickname>: <text>"` and returns the sent message so
    /// the front end can echo it.
    ///
    /// Sending `{quit}` disconnects right after the write.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] unless `Connected`.
    /// - [`ClientError::Protocol`] if the line exceeds one read buffer.
    /// - [`ClientError::Io`] if the write fails; the session is then
    ///   disconnected.
    pub async fn send(&self, text: &str) -> Result<ChatMessage, ClientError> {
        let message = ChatMessage::new(self.config.nickname.as_str(), text);
        let plaintext = message.to_wire_bytes()?;

        {
            let mut guard = self.link.lock().await;
            let link = guard.as_mut().ok_or(ClientError::NotConnected)?;
            let ciphertext = link.cipher.encrypt(&plaintext);
            let written = link.writer.write_all(&ciphertext).await;
            if let Err(e) = written {
                warn!("send failed: {e}");
                if let Some(link) = guard.take() {
                    self.state.send_replace(SessionState::Disconnected);
                    drop(guard);
                    shut_down(link).await;
                }
                return Err(ClientError::Io(e));
            }
        }

        if message.is_quit() {
            info!("sent quit; closing connection");
            self.disconnect().await;
        }
        Ok(message)
    }

    /// Closes the connection and waits for the read loop to finish.
    ///
    /// Returns `false` if there was nothing to close.
    pub async fn disconnect(&self) -> bool {
        let link = {
            let mut guard = self.link.lock().await;
            let link = guard.take();
            if link.is_some() {
                self.state.send_replace(SessionState::Disconnected);
            }
            link
        };
        match link {
            Some(link) => {
                shut_down(link).await;
                true
            }
            None => false,
        }
    }
}

/// Stops the read loop, half-closes the socket, and joins the reader task.
async fn shut_down(mut link: Link) {
    link.shutdown_tx.send_replace(true);
    if let Err(e) = link.writer.shutdown().await {
        debug!("socket shutdown: {e}");
    }
    if let Err(e) = link.reader_task.await {
        warn!("read loop ended abnormally: {e}");
    }
}

// ── Read loop ─────────────────────────────────────────────────────────────────

/// Everything the background read loop owns.
struct ReadLoop {
    generation: u64,
    reader: OwnedReadHalf,
    cipher: CipherSession,
    events: mpsc::Sender<SessionEvent>,
    shutdown: watch::Receiver<bool>,
    link: Arc<Mutex<Option<Link>>>,
    state: Arc<watch::Sender<SessionState>>,
}

async fn read_loop(mut ctx: ReadLoop) {
    let reason = receive_until_closed(&mut ctx).await;
    debug!("read loop finished: {reason:?}");

    // Only tear down the link this loop belongs to; a newer connection may
    // already be in place after a local disconnect.
    {
        let mut guard = ctx.link.lock().await;
        if guard.as_ref().is_some_and(|link| link.generation == ctx.generation) {
            guard.take();
            ctx.state.send_replace(SessionState::Disconnected);
        }
    }

    // A local disconnect joins this task, so never block on a full queue then.
    let event = SessionEvent::Disconnected(reason);
    if *ctx.shutdown.borrow() {
        let _ = ctx.events.try_send(event);
    } else {
        let _ = ctx.events.send(event).await;
    }
}

async fn receive_until_closed(ctx: &mut ReadLoop) -> DisconnectReason {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        if *ctx.shutdown.borrow_and_update() {
            return DisconnectReason::Local;
        }
        let n = tokio::select! {
            result = ctx.reader.read(&mut buf) => match result {
                Ok(0) => return DisconnectReason::RemoteClosed,
                Ok(n) => n,
                Err(e) => return DisconnectReason::Failed(e.to_string()),
            },
            _ = ctx.shutdown.changed() => return DisconnectReason::Local,
        };

        let event = match decode_text(ctx.cipher.decrypt(&buf[..n])) {
            Ok(text) => SessionEvent::Message(text),
            Err(e) => {
                warn!("dropping undecodable frame: {e}");
                SessionEvent::DecodeError(e)
            }
        };
        tokio::select! {
            sent = ctx.events.send(event) => if sent.is_err() {
                // Nobody is listening any more.
                return DisconnectReason::Local;
            },
            _ = ctx.shutdown.changed() => return DisconnectReason::Local,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use lanchat_core::KeyMaterial;
    use tokio::net::TcpListener;

    #[test]
    fn test_default_config_has_five_second_handshake_timeout() {
        let cfg = ClientSessionConfig::default();
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_new_session_is_disconnected() {
        let session = ClientSession::new(ClientSessionConfig::default());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_before_connect_is_rejected() {
        let session = ClientSession::new(ClientSessionConfig::default());

        let result = session.send("hello").await;

        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_while_disconnected_returns_false() {
        let session = ClientSession::new(ClientSessionConfig::default());
        assert!(!session.disconnect().await);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_reports_connect_failure() {
        // Arrange: bind then drop to find a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let session = ClientSession::new(ClientSessionConfig::default());

        // Act
        let result = session.connect(addr).await;

        // Assert
        assert!(matches!(result, Err(ClientError::ConnectFailed { .. })));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_silent_server_hits_handshake_timeout() {
        // Arrange: accepts but never sends the key.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });
        let session = ClientSession::new(ClientSessionConfig {
            handshake_timeout: Duration::from_millis(100),
            ..ClientSessionConfig::default()
        });

        // Act
        let result = session.connect(addr).await;

        // Assert
        assert!(matches!(
            result,
            Err(ClientError::Handshake {
                source: HandshakeError::TimedOut,
                ..
            })
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_oversized_message_is_rejected_before_writing() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let material = KeyMaterial::generate();
        let handshake = material.to_handshake_bytes();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(&handshake).await.unwrap();
            stream
        });
        let session = ClientSession::new(ClientSessionConfig::default());
        let _events = session.connect(addr).await.unwrap();
        let _server_stream = server.await.unwrap();

        // Act
        let result = session.send(&"x".repeat(READ_BUFFER_SIZE)).await;

        // Assert
        assert!(matches!(
            result,
            Err(ClientError::Protocol(ProtocolError::MessageTooLarge { .. }))
        ));
        assert_eq!(session.state(), SessionState::Connected);
    }
}
