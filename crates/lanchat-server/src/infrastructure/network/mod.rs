//! Network infrastructure for the coordinator.
//!
//! # Sub-modules
//!
//! - **`coordinator`** – The broadcast hub: binds the listener, hands every
//!   new peer the session key, runs one read-loop task per peer, relays
//!   messages, and shuts everything down on `stop()`.
//!
//! - **`peer_connection`** – One accepted TCP connection: encrypted writes
//!   behind a per-peer mutex and the framing-free read loop.
//!
//! - **`lan_address`** – Works out which local IPv4 address peers on the LAN
//!   should dial.

pub mod coordinator;
pub mod lan_address;
pub mod peer_connection;

pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorEvent, CoordinatorState,
};
pub use peer_connection::{InboundHandler, PeerConnection, ReadLoopExit};
