//! Infrastructure layer for the chat client.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `lanchat_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`network`** – The TCP session to the coordinator: key handshake,
//!   encrypted send, and the background read loop.
//!
//! - **`transcript`** – `FileTranscript`, the on-disk `TranscriptSink`.

pub mod network;
pub mod transcript;
