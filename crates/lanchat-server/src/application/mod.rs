//! Application layer use cases for the coordinator.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure business rules) and the infrastructure (OS/network/storage).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** the peer set to fulfil a goal (e.g., "relay this line to
//!   everyone except the sender").
//! - **Depend on abstractions** (the [`broadcast::PeerSink`] trait) rather than
//!   on TCP sockets, so the fan-out rules can be tested without a network.
//!
//! # Sub-modules
//!
//! - **`peer_registry`** – The coordinator's set of live peers: insert on
//!   accept, remove on failure, point-in-time snapshots for fan-out.
//!
//! - **`broadcast`** – Delivers one message to every peer except its
//!   originator, tolerating individual delivery failures.

pub mod broadcast;
pub mod peer_registry;
