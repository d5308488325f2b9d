//! # TG-02 MQTT Transport
//!
//! Device facing MQTT 3.1/3.1.1 endpoint.
//!
//! **Subsystem ID:** 2
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Wire codec for the supported control packets
//! - Per-connection session state machine with token or X.509 authentication
//! - JSON payload conversion for the fixed `v1/devices/me` topic namespace
//! - Gateway sessions multiplexing child devices over `v1/gateway`
//! - Device bound delivery with QoS taken from the client's subscriptions
//!
//! ## Delivery
//!
//! Inbound QoS 1 messages are acknowledged only after the transport service
//! accepted them. QoS 2 is downgraded to QoS 1 at subscribe time.
//!
//! ## Module Structure
//!
//! ```text
//! tg-02-mqtt-transport/
//! ├── domain/          # Packets, topics, topic matcher, session state, errors
//! ├── codec/           # MqttCodec (tokio-util Decoder/Encoder)
//! ├── adaptor/         # JsonMqttAdaptor
//! ├── ports/           # PacketHandler + TransportService traits
//! ├── handler/         # MqttSessionHandler, GatewaySessionHandler
//! └── adapters/        # MqttTransportServer (TCP accept loop)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adaptor;
pub mod adapters;
pub mod codec;
pub mod domain;
pub mod handler;
pub mod ports;

// Re-exports
pub use adaptor::JsonMqttAdaptor;
pub use adapters::{MqttServerConfig, MqttTransportServer};
pub use codec::MqttCodec;
pub use domain::{
    AdaptorError, ConnectReturnCode, Packet, ProtocolError, QoS, Reaction, SessionState,
    TopicMatcher, TopicQosMap, TransportError,
};
pub use handler::{certificate_fingerprint, GatewaySessionHandler, MqttSessionHandler};
pub use ports::{MockTransportService, PacketHandler, TransportService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
