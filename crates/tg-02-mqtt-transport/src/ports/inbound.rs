//! # Inbound Port
//!
//! Implemented by a session, driven by the socket adapter.

use crate::domain::{Packet, Reaction};
use async_trait::async_trait;
use shared_types::DeviceToTransportMsg;
use std::time::Duration;

/// Packet handler - inbound port.
///
/// One instance per connection. Calls are never concurrent.
#[async_trait]
pub trait PacketHandler: Send {
    /// A decoded frame arrived.
    async fn on_packet(&mut self, packet: Packet) -> Reaction;

    /// A device actor pushed a message to this connection.
    async fn on_command(&mut self, msg: DeviceToTransportMsg) -> Reaction;

    /// The socket is gone, for any reason. Called exactly once.
    async fn on_transport_closed(&mut self);

    /// Keep alive negotiated by CONNECT, `None` until then or when disabled.
    fn keep_alive(&self) -> Option<Duration>;
}
