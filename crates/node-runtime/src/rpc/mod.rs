//! # Cluster RPC
//!
//! Node to node forwarding. Envelopes for devices owned elsewhere travel as
//! [`RpcMessage::ToDevice`], replies for sessions held elsewhere as
//! [`RpcMessage::ToTransport`]. Each frame is a 4 byte big-endian length
//! followed by the bincode encoding of the message.

pub mod client;
pub mod codec;
pub mod server;

pub use client::ClusterRpcClient;
pub use codec::{RpcCodec, RpcMessage};
pub use server::ClusterRpcServer;

use thiserror::Error;

/// Cluster RPC failures.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame body that is not a valid message.
    #[error("Malformed frame: {0}")]
    Codec(#[from] bincode::Error),

    /// The peer did not accept the connection in time.
    #[error("Connect to {0} timed out")]
    ConnectTimeout(String),

    /// The node id is not `host:port`.
    #[error("Invalid node address: {0}")]
    InvalidAddress(String),
}
