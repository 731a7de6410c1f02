//! Server configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Configuration for the huddle server. Every field has a default, so a
/// config file only needs the keys it overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind. `0` picks a free port.
    pub port: u16,
    /// Outbound frames buffered per client before new ones are dropped.
    pub max_send_queue: usize,
    /// Capacity of the session event channel feeding the event bridge.
    pub broadcast_capacity: usize,
    pub heartbeat_interval_secs: u64,
    /// Clients silent for longer than this are disconnected.
    pub client_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9091,
            max_send_queue: 256,
            broadcast_capacity: 1024,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            cleanup_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ServerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Timer periods and queue sizes must be non-zero.
    pub fn validate(&self) -> Result<(), ServerError> {
        let required = [
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("client_timeout_secs", self.client_timeout_secs),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
            ("max_send_queue", self.max_send_queue as u64),
            ("broadcast_capacity", self.broadcast_capacity as u64),
        ];
        match required.iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(ServerError::InvalidConfig(format!("{key} must be greater than 0"))),
            None => Ok(()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
