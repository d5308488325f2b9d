//! # Session State
//!
//! Lifecycle of one device connection.

use crate::domain::packets::Packet;
use std::fmt;

/// Connection state. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for CONNECT.
    #[default]
    Unauthenticated,
    /// Credentials handed to the validator, awaiting its answer.
    Authenticating,
    /// Device identified, application traffic allowed.
    Connected,
    /// Closed. No further frames are processed.
    Disconnected,
}

impl SessionState {
    /// True once the device is identified and not yet gone.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Authenticating => "AUTHENTICATING",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}

/// What the connection driver must do after a session handled an event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reaction {
    /// Packets to write, in order.
    pub packets: Vec<Packet>,
    /// Close the socket after writing.
    pub close: bool,
}

impl Reaction {
    /// Nothing to do.
    pub fn none() -> Self {
        Self::default()
    }

    /// Write one packet.
    pub fn reply(packet: Packet) -> Self {
        Self {
            packets: vec![packet],
            close: false,
        }
    }

    /// Close without writing.
    pub fn close() -> Self {
        Self {
            packets: Vec::new(),
            close: true,
        }
    }

    /// Queue another packet.
    pub fn push(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    /// Write then close.
    pub fn and_close(mut self) -> Self {
        self.close = true;
        self
    }
}
