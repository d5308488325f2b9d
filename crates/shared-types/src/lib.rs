//! # Shared Types Crate
//!
//! Identifiers, cluster topology types and the transport envelope shared by
//! every subsystem of the telemetry gateway.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-crate types are defined here.
//! - **Wire Safe**: Everything carried by the cluster RPC is plain `serde`
//!   data with no `deserialize_any` requirements, so it survives `bincode`.
//! - **Routing Key**: Every envelope exposes the [`EntityId`] that decides
//!   which cluster node owns it.

pub mod entities;
pub mod errors;
pub mod messages;
pub mod security;

pub use entities::*;
pub use errors::*;
pub use messages::*;
pub use security::*;
