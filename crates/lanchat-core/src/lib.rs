//! # lanchat-core
//!
//! Shared library for LanChat containing the cipher session, the session key
//! material, and the chat message protocol.
//!
//! This crate is used by both the coordinator (`lanchat-server`) and the peer
//! (`lanchat-client`).  It has zero dependencies on OS APIs, UI frameworks,
//! or network sockets: all socket handling lives in the two application crates.
//!
//! # Architecture overview (for beginners)
//!
//! LanChat is a LAN text chat.  One machine runs the *coordinator*, which
//! listens on TCP port 5555.  Every other machine runs a *peer* that connects
//! to it.  When a peer sends a line of text, the coordinator relays it to
//! every other connected peer.
//!
//! This crate (`lanchat-core`) is the shared foundation.  It defines:
//!
//! - **`crypto`** – How payloads are protected.  The coordinator generates one
//!   AES-256 key and one IV per run and hands them to each peer.  Every chat
//!   message is encrypted with AES-256 in CFB mode, restarted from the same IV
//!   for every message.
//!
//! - **`protocol`** – What travels on the wire: the unencrypted key/IV
//!   handshake, the `"<nickname>: <text>"` message layout, the `{quit}`
//!   sentinel, and the buffer size a single read is expected to cover.

pub mod crypto;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `lanchat_core::CipherSession` instead of `lanchat_core::crypto::cipher::CipherSession`.
pub use crypto::cipher::{CipherError, CipherSession};
pub use crypto::keys::KeyMaterial;
pub use protocol::message::{decode_text, ChatMessage, ProtocolError};
