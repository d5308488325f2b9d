//! # Domain Errors
//!
//! Error types for the Cluster Routing subsystem.

use shared_types::ServerAddress;
use thiserror::Error;

/// Cluster routing error types.
///
/// An empty ring is not an error: `resolve` answers `None` and the caller
/// handles the entity locally.
#[derive(Debug, Clone, Error)]
pub enum RoutingError {
    /// Hash function name not recognised.
    #[error("Unknown hash function: {0}")]
    UnknownHashFunction(String),

    /// Virtual node count must be at least one.
    #[error("Invalid virtual nodes size: {0}")]
    InvalidVirtualNodes(usize),

    /// Local actor runtime refused the message.
    #[error("Local dispatch failed: {0}")]
    LocalDispatch(String),

    /// Remote node could not be reached or rejected the message.
    #[error("Remote send to {address} failed: {reason}")]
    RemoteSend {
        /// Target node
        address: ServerAddress,
        /// Cause
        reason: String,
    },
}
