//! # Configuration System
//!
//! Typed configuration for the coordination core. Every section has
//! defaults, so an empty source yields a working single-node setup.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshsync::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // File named by MESHSYNC_CONFIG (optional) overlaid with MESHSYNC__* variables
//! let manager = ConfigManager::load()?;
//! let interval = manager.config().dispatch.interval_ms;
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::cluster::Node;
use crate::constants::defaults;
use crate::error::{MeshError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MeshConfig {
    /// Event dispatch settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Command execution settings
    #[serde(default)]
    pub commands: CommandConfig,

    /// In-process transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Identity of the local node
    #[serde(default)]
    pub node: NodeConfig,

    /// Flat properties seeded into the property source (list entries,
    /// group parents, handler toggles)
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl MeshConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.interval_ms == 0 {
            return Err(MeshError::Configuration(
                "dispatch.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.dispatch.timeout_ms < self.dispatch.interval_ms {
            return Err(MeshError::Configuration(format!(
                "dispatch.timeout_ms ({}) must be at least dispatch.interval_ms ({})",
                self.dispatch.timeout_ms, self.dispatch.interval_ms
            )));
        }
        if self.commands.default_timeout_ms == 0 {
            return Err(MeshError::Configuration(
                "commands.default_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.transport.channel_capacity == 0 {
            return Err(MeshError::Configuration(
                "transport.channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Worker model used by the event dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolMode {
    /// One task per dispatched event
    #[default]
    Cached,
    /// A single worker processing events one at a time
    Single,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    #[serde(default = "default_dispatch_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_dispatch_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub pool: PoolMode,
}

impl DispatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_dispatch_interval_ms(),
            timeout_ms: default_dispatch_timeout_ms(),
            pool: PoolMode::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandConfig {
    /// Timeout applied to commands built without an explicit one
    #[serde(default = "default_command_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Reject commands with empty ids or zero timeouts before submission
    #[serde(default = "default_true")]
    pub validate_ids: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_command_timeout_ms(),
            validate_ids: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Node id; generated when absent
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub alias: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl NodeConfig {
    /// Build the local node, deriving an id from host and port when unset
    pub fn to_node(&self) -> Node {
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port));
        let node = Node::new(id, self.host.clone(), self.port);
        match &self.alias {
            Some(alias) => node.with_alias(alias.clone()),
            None => node,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: None,
            alias: None,
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_dispatch_interval_ms() -> u64 {
    defaults::DISPATCH_INTERVAL_MS
}

fn default_dispatch_timeout_ms() -> u64 {
    defaults::DISPATCH_TIMEOUT_MS
}

fn default_command_timeout_ms() -> u64 {
    defaults::COMMAND_TIMEOUT_MS
}

fn default_channel_capacity() -> usize {
    defaults::CHANNEL_CAPACITY
}

fn default_host() -> String {
    defaults::NODE_HOST.to_string()
}

fn default_port() -> u16 {
    defaults::NODE_PORT
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MeshConfig::default();
        assert_eq!(config.dispatch.interval_ms, 1_000);
        assert_eq!(config.dispatch.timeout_ms, 10_000);
        assert_eq!(config.dispatch.pool, PoolMode::Cached);
        assert_eq!(config.commands.default_timeout_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_inverted_dispatch_window() {
        let mut config = MeshConfig::default();
        config.dispatch.timeout_ms = 10;
        config.dispatch.interval_ms = 100;
        assert!(matches!(config.validate(), Err(MeshError::Configuration(_))));
    }

    #[test]
    fn test_node_id_derived_from_address() {
        let node = NodeConfig::default().to_node();
        assert_eq!(node.id, "127.0.0.1:5701");
        assert!(node.alias.is_none());
    }
}
