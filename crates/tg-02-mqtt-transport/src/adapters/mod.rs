//! # Adapters
//!
//! TCP listener driving one [`MqttSessionHandler`](crate::MqttSessionHandler)
//! per connection.

pub mod server;

pub use server::{MqttServerConfig, MqttTransportServer};
