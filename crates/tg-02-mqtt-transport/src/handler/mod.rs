//! # Session Handlers
//!
//! Per-connection MQTT session and gateway child multiplexing.

pub mod gateway;
pub mod session_handler;

pub use gateway::GatewaySessionHandler;
pub use session_handler::{certificate_fingerprint, MqttSessionHandler};
