//! # Node Runtime Library
//!
//! Everything one telemetry gateway node runs, exposed as a library so the
//! binary and the integration tests share the wiring.
//!
//! ```text
//!  MQTT ──▶ tg-02 session ──▶ LocalTransportService ──▶ MessageRouter (tg-01)
//!                                                          │        │
//!                                                     local│        │remote
//!                                                          ▼        ▼
//!                                              DeviceActorSystem  ClusterRpcClient ──▶ peer
//!                                                          │
//!                                                          ▼
//!                                        PartitionedBatchQueue (tg-04) ──▶ BulkWriter
//! ```
//!
//! ## Modules
//!
//! - `config/` - TOML configuration for every subsystem
//! - `credentials/` - Device credential store
//! - `actors/` - Per-device workers
//! - `transport/` - Transport service, session registry, reply routing
//! - `rpc/` - Node to node forwarding
//! - `api/` - HTTP API behind API key auth and rate limits
//! - `store/` - Default persistence sink
//! - `node/` - Startup and shutdown

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod actors;
pub mod api;
pub mod config;
pub mod credentials;
pub mod node;
pub mod rpc;
pub mod store;
pub mod transport;

pub use config::{ConfigError, NodeConfig, CONFIG_PATH_ENV};
pub use node::{BoundAddresses, NodeRuntime};
pub use store::LatestValueStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
