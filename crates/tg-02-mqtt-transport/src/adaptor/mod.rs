//! # Payload Adaptors
//!
//! Conversion between PUBLISH payloads and transport messages.

pub mod json;

pub use json::{JsonMqttAdaptor, OutboundPublish};
