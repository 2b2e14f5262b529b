//! Wire-level constants and the chat message layout.
//!
//! # Connection lifecycle on the wire
//!
//! ```text
//! Coordinator                                   Peer
//! ───────────                                   ────
//! accept()
//! write key (32 bytes, raw) ──────────────────► read_exact(32)
//! write IV  (16 bytes, raw) ──────────────────► read_exact(16)
//!                         ◄──────────────────── AES-CFB("alice: hello")  (one write)
//! AES-CFB("alice: hello") ──► every other peer
//!                         ◄──────────────────── AES-CFB("alice: {quit}") then close
//! ```
//!
//! # Framing
//!
//! There is no length prefix.  Each chat message is written with a single
//! write and the receiver treats each non-empty read as exactly one message.
//! This holds on a LAN because messages are far smaller than [`READ_BUFFER_SIZE`]
//! and senders pause between messages, but TCP does not guarantee it: two
//! messages may be coalesced into one read, or one message split across two.
//! Receivers surface the resulting garbage as [`message::ProtocolError::InvalidUtf8`]
//! when it is not valid text; garbled-but-valid text is not detected.

pub mod message;

use crate::crypto::{IV_LEN, KEY_LEN};

/// TCP port the coordinator listens on by default.
pub const DEFAULT_PORT: u16 = 5555;

/// Total length of the unencrypted key/IV handshake.
pub const HANDSHAKE_LEN: usize = KEY_LEN + IV_LEN;

/// Size of the buffer each read loop reads into; one read is one message.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Message body a peer sends to announce it is leaving.
pub const QUIT_SENTINEL: &str = "{quit}";

/// Text the coordinator sends to every peer when it shuts down.
pub const SHUTDOWN_NOTICE: &str = "Server is stopping...";
