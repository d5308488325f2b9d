//! # Domain Errors
//!
//! - [`ProtocolError`]: malformed wire data. The connection is closed.
//! - [`AdaptorError`]: a payload that does not fit its topic.
//! - [`TransportError`]: failures talking to the transport service.

use thiserror::Error;

/// Wire level violations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid packet.
    #[error("Malformed packet: {0}")]
    Malformed(String),

    /// Packet type outside the supported set.
    #[error("Unsupported packet type: {0}")]
    UnsupportedPacketType(u8),

    /// CONNECT with a protocol level other than 3.1 or 3.1.1.
    #[error("Unsupported protocol level: {0}")]
    UnsupportedProtocolLevel(u8),

    /// Remaining length over the configured maximum.
    #[error("Packet too large: {size} bytes (max {max})")]
    PacketTooLarge {
        /// Declared size
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// QoS bits set to 3.
    #[error("Invalid QoS: {0}")]
    InvalidQos(u8),
}

/// Payload conversion failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdaptorError {
    /// Payload is not JSON.
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// JSON does not have the expected shape.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Topic suffix is not a request id.
    #[error("Invalid request id in topic: {0}")]
    InvalidRequestId(String),
}

impl From<serde_json::Error> for AdaptorError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(err.to_string())
    }
}

/// Failures at the transport service boundary.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The credential validator could not answer.
    #[error("Credential validation failed: {0}")]
    Validation(String),

    /// Forwarding to the owning device actor failed.
    #[error("Forward failed: {0}")]
    Forward(String),

    /// A gateway child device could not be resolved.
    #[error("Device lookup failed: {0}")]
    DeviceLookup(String),

    /// Payload conversion failed.
    #[error(transparent)]
    Adaptor(#[from] AdaptorError),
}
