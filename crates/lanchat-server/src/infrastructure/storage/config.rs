//! TOML-based configuration for the coordinator.
//!
//! Default file location:
//! - Windows:  `%APPDATA%\LanChat\server.toml`
//! - Linux:    `$XDG_CONFIG_HOME/lanchat/server.toml` (or `~/.config/lanchat/server.toml`)
//! - macOS:    `~/Library/Application Support/LanChat/server.toml`
//!
//! Example:
//!
//! ```toml
//! [server]
//! log_level = "info"
//! shutdown_notice = "Server is stopping..."
//! shutdown_grace_ms = 1000
//!
//! [network]
//! bind_address = "0.0.0.0"
//! port = 5555
//! accept_poll_ms = 200
//! write_timeout_ms = 5000
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, and so does every section.
//! An empty file, a file with only `[network]`, or no file at all all produce
//! a working configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lanchat_core::protocol::{DEFAULT_PORT, SHUTDOWN_NOTICE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::CoordinatorConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `bind_address` is not an IPv4 address.
    #[error("invalid bind address {value:?}: {source}")]
    InvalidBindAddress {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level coordinator configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub network: NetworkSection,
}

/// Operator-facing behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Text sent (encrypted) to every peer when the coordinator stops.
    #[serde(default = "default_shutdown_notice")]
    pub shutdown_notice: String,
    /// How long a stop waits for each peer's notice before closing it.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

/// Listening socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// IPv4 address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on how long the accept loop waits before re-checking for
    /// a stop request.
    #[serde(default = "default_accept_poll_ms")]
    pub accept_poll_ms: u64,
    /// A write to a peer blocked longer than this drops the peer.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_shutdown_notice() -> String {
    SHUTDOWN_NOTICE.to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_accept_poll_ms() -> u64 {
    200
}
fn default_write_timeout_ms() -> u64 {
    5_000
}
fn default_shutdown_grace_ms() -> u64 {
    1_000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            shutdown_notice: default_shutdown_notice(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            accept_poll_ms: default_accept_poll_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// Builds the runtime [`CoordinatorConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] if `bind_address` does not
    /// parse as an IPv4 address.  IPv6 literals are rejected.
    pub fn to_coordinator_config(&self) -> Result<CoordinatorConfig, ConfigError> {
        let ip: Ipv4Addr = self
            .network
            .bind_address
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddress {
                value: self.network.bind_address.clone(),
                source,
            })?;
        Ok(CoordinatorConfig {
            bind_addr: SocketAddr::new(ip.into(), self.network.port),
            accept_poll_interval: Duration::from_millis(self.network.accept_poll_ms),
            shutdown_notice: self.server.shutdown_notice.clone(),
            write_timeout: Duration::from_millis(self.network.write_timeout_ms),
            shutdown_grace: Duration::from_millis(self.server.shutdown_grace_ms),
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default path of the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("server.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from the default location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<ServerConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `ServerConfig` from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory, including the `LanChat` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LanChat"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("lanchat"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LanChat")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
