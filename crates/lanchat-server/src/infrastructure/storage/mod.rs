//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the coordinator's TOML file from the
//! platform config directory (or an explicit path), fills in defaults for
//! anything missing, and turns the result into a runtime
//! [`CoordinatorConfig`](crate::infrastructure::network::CoordinatorConfig).

pub mod config;
