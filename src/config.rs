//! Connection configuration.
//!
//! Host and port default to `localhost:6379` and can be overridden with the
//! `REDIS_HOST` and `REDIS_PORT` environment variables.
//!
//! # Example
//!
//! ```
//! use respwire_client::ConnectionConfig;
//!
//! let config = ConnectionConfig::from_lookup(|key| match key {
//!     "REDIS_PORT" => Some("6380".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//!
//! assert_eq!(config.host, "localhost");
//! assert_eq!(config.port, 6380);
//! ```

use crate::error::{RespwireError, Result};
use crate::protocol::DecodeLimits;
use crate::writer::WriterConfig;

/// Default store host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default store port.
pub const DEFAULT_PORT: u16 = 6379;

/// Default socket read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Environment variable overriding the host.
pub const HOST_ENV: &str = "REDIS_HOST";

/// Environment variable overriding the port.
pub const PORT_ENV: &str = "REDIS_PORT";

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Store host name or address.
    pub host: String,
    /// Store port.
    pub port: u16,
    /// Bytes requested per socket read.
    pub read_buffer_size: usize,
    /// Decoder length bounds.
    pub limits: DecodeLimits,
    /// Outbound queue settings.
    pub writer: WriterConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            limits: DecodeLimits::default(),
            writer: WriterConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Create a config for `host:port` with default tuning.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Read host and port from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read host and port through `lookup`, falling back to the defaults.
    ///
    /// Empty values count as unset. A port that is not a `u16` is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup(HOST_ENV).filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }

        if let Some(port) = lookup(PORT_ENV).filter(|p| !p.trim().is_empty()) {
            config.port = port.trim().parse().map_err(|_| {
                RespwireError::Config(format!("{} must be a port number, got {:?}", PORT_ENV, port))
            })?;
        }

        Ok(config)
    }

    /// `host:port` for display.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
