//! Application layer use cases for the chat client.
//!
//! - **`chat_feed`** – Formats every line the user sees (own echo, relayed
//!   messages, status notes) and appends it to the transcript.  The transcript
//!   itself is a [`chat_feed::TranscriptSink`] injected at construction, so
//!   this layer never touches the filesystem.

pub mod chat_feed;
