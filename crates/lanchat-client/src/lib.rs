//! lanchat-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! The client:
//!
//! 1. Connects to the coordinator and reads the 32-byte key and 16-byte IV it
//!    sends first.
//! 2. Encrypts each line the user types as `"<nickname>: <text>"` and writes
//!    it to the coordinator, which relays it to every other peer.
//! 3. Decrypts whatever the coordinator relays and shows it, recording
//!    everything shown in a transcript file.
//!
//! Typing `{quit}` (or pressing Ctrl+C) tells the room you are leaving and
//! closes the connection.

/// Application layer: display and transcript use case.
pub mod application;

/// Infrastructure layer: network session and transcript file.
pub mod infrastructure;
