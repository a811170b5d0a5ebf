//! Channel identity and configuration.
//!
//! A [`ChannelConfig`] is supplied once when the client attaches and is never
//! mutated afterwards.
//!
//! # Example
//!
//! ```
//! use vnet_ipc_client::ChannelConfig;
//!
//! let config = ChannelConfig::new("/var/run/switch.sock", 7).retry_interval_secs(2);
//! assert_eq!(config.retry_interval().as_secs(), 2);
//!
//! let parsed = ChannelConfig::from_json(
//!     r#"{"socket_path": "/var/run/switch.sock", "node_id": 7, "retry_interval_secs": 2}"#,
//! )
//! .unwrap();
//! assert_eq!(parsed, config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Default delay between a failed or closed channel and the next attempt.
pub const DEFAULT_RETRY_INTERVAL_SECS: u32 = 1;

/// Default ceiling on how much guest memory the backend will map.
pub const DEFAULT_SIZE_CEILING: u32 = 0xE000_0000;

fn default_retry_interval_secs() -> u32 {
    DEFAULT_RETRY_INTERVAL_SECS
}

fn default_size_ceiling() -> u32 {
    DEFAULT_SIZE_CEILING
}

/// Immutable identity of one device's channel to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Filesystem path of the backend's Unix socket.
    pub socket_path: String,
    /// Node identifier announced in the init message.
    pub node_id: u32,
    /// Fixed retry interval in seconds.
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u32,
    /// Memory-size ceiling sent to the backend.
    #[serde(default = "default_size_ceiling")]
    pub size_ceiling: u32,
}

impl ChannelConfig {
    /// Create a configuration with default retry interval and size ceiling.
    pub fn new(socket_path: impl Into<String>, node_id: u32) -> Self {
        Self {
            socket_path: socket_path.into(),
            node_id,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            size_ceiling: DEFAULT_SIZE_CEILING,
        }
    }

    /// Set the retry interval in seconds.
    pub fn retry_interval_secs(mut self, secs: u32) -> Self {
        self.retry_interval_secs = secs;
        self
    }

    /// Set the memory-size ceiling sent during the handshake.
    pub fn size_ceiling(mut self, ceiling: u32) -> Self {
        self.size_ceiling = ceiling;
        self
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.is_empty() {
            return Err(LinkError::Config("socket path is empty".to_string()));
        }
        if self.retry_interval_secs == 0 {
            return Err(LinkError::Config(
                "retry interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry interval as a [`Duration`].
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.retry_interval_secs))
    }
}
