//! # TG-01 Cluster Routing
//!
//! Decides which cluster node owns the in-memory state of an entity.
//!
//! **Subsystem ID:** 1
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Consistent hashing with virtual nodes, one ring per server role
//! - Pluggable hash function selected by name
//! - Membership driven by discovery events from the shared bus
//! - `MessageRouter` picking local hand-off or remote send per envelope
//!
//! ## Concurrency
//!
//! Rings are copy-on-write: lookups load an `Arc` snapshot without locking,
//! membership changes are serialized and publish a new snapshot.
//!
//! ## Module Structure
//!
//! ```text
//! tg-01-cluster-routing/
//! ├── domain/          # RoutingConfig, HashFunctionKind, RoutingError
//! ├── algorithms/      # Hash functions, ConsistentHashRing
//! ├── ports/           # ClusterRoutingApi + Discovery/Dispatch traits
//! ├── adapters/        # Static discovery, membership listener
//! ├── service.rs       # ClusterRoutingService
//! └── router.rs        # MessageRouter
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod domain;
pub mod ports;
pub mod router;
pub mod service;

// Re-exports
pub use adapters::{MembershipListener, StaticDiscoveryService};
pub use algorithms::ConsistentHashRing;
pub use domain::{HashFunctionKind, RoutingConfig, RoutingError, DEFAULT_VIRTUAL_NODES};
pub use ports::{
    ClusterRoutingApi, DiscoveryService, LocalDispatcher, MockLocalDispatcher, MockRemoteSender,
    RemoteSender,
};
pub use router::{MessageRouter, RouteDecision};
pub use service::ClusterRoutingService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
