//! # Node Configuration
//!
//! Unified configuration for all subsystems and runtime parameters, read
//! from a TOML file. Every section has defaults, so an empty file (or no
//! file at all) yields a working single node.
//!
//! ```toml
//! [cluster]
//! hash_function_name = "murmur3_128"
//! virtual_nodes_size = 16
//! advertised_host = "10.0.0.1"
//!
//! [[cluster.peers]]
//! host = "10.0.0.2"
//! port = 7070
//!
//! [transport]
//! mqtt_bind = "0.0.0.0:1883"
//!
//! [rate_limits.tenant]
//! enabled = true
//! configuration = "100:1,2000:60"
//!
//! [[devices]]
//! name = "thermostat-1"
//! tenant_id = "4b1c3d7e-0000-0000-0000-000000000001"
//! access_token = "A1_TEST_TOKEN"
//! ```

use crate::credentials::DeviceCredentialEntry;
use serde::{Deserialize, Serialize};
use shared_types::{Authority, ServerInstance, ServerType};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tg_01_cluster_routing::{RoutingConfig, RoutingError, DEFAULT_VIRTUAL_NODES};
use tg_02_mqtt_transport::codec::DEFAULT_MAX_PAYLOAD_SIZE;
use tg_02_mqtt_transport::MqttServerConfig;
use tg_03_rate_limiting::{RateLimitConfigError, RateLimitsConfig};
use tg_04_batch_queue::{QueueConfig, QueueConfigError};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "TG_CONFIG";

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Ring and membership.
    pub cluster: ClusterConfig,
    /// MQTT listener.
    pub transport: TransportConfig,
    /// Tenant and customer limits for the HTTP API.
    pub rate_limits: RateLimitsConfig,
    /// Persistence queues.
    pub queues: QueueConfig,
    /// HTTP API.
    pub api: ApiConfig,
    /// Cluster RPC listener.
    pub rpc: RpcConfig,
    /// Static credential table.
    pub devices: Vec<DeviceCredentialEntry>,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Ring settings are invalid.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// A rate limit string does not parse.
    #[error(transparent)]
    RateLimit(#[from] RateLimitConfigError),

    /// Queue settings are invalid.
    #[error(transparent)]
    Queue(#[from] QueueConfigError),

    /// Anything else.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Reads the file at `path`. No path, or a path that does not exist,
    /// yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("[node] Configuration file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Rejects settings the node cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cluster.routing_config()?;
        self.rate_limits.validate()?;
        self.queues.validate()?;
        if self.transport.max_payload_size == 0 {
            return Err(ConfigError::Invalid(
                "transport.max_payload_size must be at least 1".into(),
            ));
        }

        let mut tokens = HashSet::new();
        let mut fingerprints = HashSet::new();
        for device in &self.devices {
            if let Some(token) = &device.access_token {
                if !tokens.insert(token.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "access token of device '{}' is already in use",
                        device.name
                    )));
                }
            }
            if let Some(fingerprint) = &device.certificate_fingerprint {
                if !fingerprints.insert(fingerprint.to_ascii_lowercase()) {
                    return Err(ConfigError::Invalid(format!(
                        "certificate of device '{}' is already in use",
                        device.name
                    )));
                }
            }
        }

        let mut keys = HashSet::new();
        for user in &self.api.users {
            if !keys.insert(user.api_key.as_str()) {
                return Err(ConfigError::Invalid("duplicate api key".into()));
            }
        }
        Ok(())
    }
}

/// Ring and membership configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// One of `murmur3_32`, `murmur3_128`, `sha256`, `sha3_256`, `xxhash64`.
    pub hash_function_name: String,
    /// Ring positions per member.
    pub virtual_nodes_size: usize,
    /// Host other nodes use to reach this node's RPC port.
    pub advertised_host: String,
    /// Role of this node.
    pub server_type: ServerType,
    /// Statically known members.
    pub peers: Vec<PeerConfig>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            hash_function_name: "murmur3_128".to_string(),
            virtual_nodes_size: DEFAULT_VIRTUAL_NODES,
            advertised_host: "127.0.0.1".to_string(),
            server_type: ServerType::Core,
            peers: Vec::new(),
        }
    }
}

impl ClusterConfig {
    /// Typed ring settings.
    pub fn routing_config(&self) -> Result<RoutingConfig, RoutingError> {
        RoutingConfig::from_names(&self.hash_function_name, self.virtual_nodes_size)
    }

    /// Peers as ring members.
    pub fn peer_instances(&self) -> Vec<ServerInstance> {
        self.peers
            .iter()
            .map(|peer| ServerInstance::new(peer.host.clone(), peer.port, peer.server_type))
            .collect()
    }
}

/// Another cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Host name or IP.
    pub host: String,
    /// RPC port.
    pub port: u16,
    /// Role of the member.
    #[serde(default)]
    pub server_type: ServerType,
}

/// MQTT listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Listen address.
    pub mqtt_bind: SocketAddr,
    /// Largest accepted packet body in bytes.
    pub max_payload_size: usize,
    /// Time allowed between accept and CONNECT, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mqtt_bind: SocketAddr::from(([0, 0, 0, 0], 1883)),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            timeout_ms: 10_000,
        }
    }
}

impl TransportConfig {
    /// Listener settings.
    pub fn server_config(&self) -> MqttServerConfig {
        MqttServerConfig {
            max_payload_size: self.max_payload_size,
            connect_timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// How long an RPC call waits for the device's answer, in milliseconds.
    pub rpc_timeout_ms: u64,
    /// API keys and the users they authenticate.
    pub users: Vec<ApiUserEntry>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            rpc_timeout_ms: 10_000,
            users: Vec::new(),
        }
    }
}

/// A user authenticated by API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUserEntry {
    /// Secret sent in `X-Authorization: ApiKey <key>`.
    pub api_key: String,
    /// User id.
    #[serde(default = "Uuid::new_v4")]
    pub user_id: Uuid,
    /// Tenant of the user. Nil for system administrators.
    #[serde(default)]
    pub tenant_id: Uuid,
    /// Customer of the user, for customer users.
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    /// Role.
    pub authority: Authority,
}

/// Cluster RPC listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Listen address. Its port is this node's ring port.
    pub bind: SocketAddr,
    /// Connect timeout towards other nodes, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 7070)),
            connect_timeout_ms: 3_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cluster.hash_function_name, "murmur3_128");
        assert_eq!(config.cluster.virtual_nodes_size, 16);
        assert_eq!(config.queues.batch_size, 10_000);
        assert!(!config.rate_limits.tenant.enabled);
        assert_eq!(config.rate_limits.tenant.configuration, "100:1,2000:60");
    }

    #[test]
    fn test_parse_sections() {
        let config = NodeConfig::from_toml_str(
            r#"
            [cluster]
            hash_function_name = "xxhash64"
            virtual_nodes_size = 4
            advertised_host = "10.0.0.1"

            [[cluster.peers]]
            host = "10.0.0.2"
            port = 7071

            [transport]
            mqtt_bind = "127.0.0.1:1884"

            [rate_limits.customer]
            enabled = true
            configuration = "5:1"

            [queues]
            batch_size = 500
            max_delay_ms = 20

            [[devices]]
            name = "thermostat-1"
            tenant_id = "00000000-0000-0000-0000-000000000001"
            access_token = "A1_TEST_TOKEN"
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.cluster.virtual_nodes_size, 4);
        assert_eq!(
            config.cluster.peer_instances(),
            vec![ServerInstance::new("10.0.0.2", 7071, ServerType::Core)]
        );
        assert_eq!(config.transport.mqtt_bind.port(), 1884);
        assert!(config.rate_limits.customer.enabled);
        assert_eq!(config.queues.batch_size, 500);
        assert_eq!(config.queues.stats_print_interval_ms, 10_000);
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].device_type, "default");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = NodeConfig::default();
        config.cluster.virtual_nodes_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Routing(_))));

        let mut config = NodeConfig::default();
        config.cluster.hash_function_name = "md5".into();
        assert!(matches!(config.validate(), Err(ConfigError::Routing(_))));

        let mut config = NodeConfig::default();
        config.queues.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Queue(_))));

        let mut config = NodeConfig::default();
        config.rate_limits.tenant.configuration = "ten:1".into();
        assert!(matches!(config.validate(), Err(ConfigError::RateLimit(_))));
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let config = NodeConfig::from_toml_str(
            r#"
            [[devices]]
            name = "a"
            tenant_id = "00000000-0000-0000-0000-000000000001"
            access_token = "SAME"

            [[devices]]
            name = "b"
            tenant_id = "00000000-0000-0000-0000-000000000001"
            access_token = "SAME"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nrpc_timeout_ms = 250").unwrap();

        let config = NodeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.api.rpc_timeout_ms, 250);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = NodeConfig::load(Some(Path::new("/nonexistent/gateway.toml"))).unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(NodeConfig::load(None).unwrap(), NodeConfig::default());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            NodeConfig::from_toml_str("[cluster\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
