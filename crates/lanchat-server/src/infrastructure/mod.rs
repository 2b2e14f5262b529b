//! Infrastructure layer for the coordinator.
//!
//! Contains OS-facing adapters: TCP sockets and file-system storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `lanchat_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
