//! # MQTT Packets
//!
//! The MQTT 3.1.1 control packets the transport reads and writes.

use bytes::Bytes;

/// Highest QoS granted to any subscription.
pub const MAX_SUPPORTED_QOS: QoS = QoS::AtLeastOnce;

/// Return code placed in SUBACK for a refused topic.
pub const SUBACK_FAILURE: u8 = 0x80;

/// Delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QoS {
    /// Fire and forget.
    AtMostOnce = 0,
    /// Acknowledged delivery.
    AtLeastOnce = 1,
    /// Assured delivery.
    ExactlyOnce = 2,
}

impl QoS {
    /// Parses the two QoS bits.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }

    /// Wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// The requested QoS capped at [`MAX_SUPPORTED_QOS`].
    pub fn granted(self) -> Self {
        self.min(MAX_SUPPORTED_QOS)
    }
}

/// CONNACK return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    /// Connection accepted.
    Accepted = 0,
    /// Protocol level not supported.
    UnacceptableProtocolVersion = 1,
    /// Client id rejected.
    IdentifierRejected = 2,
    /// Credential validation could not be performed.
    ServerUnavailable = 3,
    /// Missing or malformed credentials.
    BadUserNameOrPassword = 4,
    /// Credentials did not identify a device.
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    /// Parses a return code byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Accepted),
            1 => Some(Self::UnacceptableProtocolVersion),
            2 => Some(Self::IdentifierRejected),
            3 => Some(Self::ServerUnavailable),
            4 => Some(Self::BadUserNameOrPassword),
            5 => Some(Self::NotAuthorized),
            _ => None,
        }
    }
}

/// CONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    /// Client identifier.
    pub client_id: String,
    /// Keep alive in seconds, 0 disables it.
    pub keep_alive: u16,
    /// Clean session flag.
    pub clean_session: bool,
    /// User name. Carries the access token.
    pub username: Option<String>,
    /// Password.
    pub password: Option<Bytes>,
}

/// PUBLISH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    /// Topic name.
    pub topic: String,
    /// Delivery guarantee.
    pub qos: QoS,
    /// Present for QoS > 0.
    pub packet_id: Option<u16>,
    /// Redelivery flag.
    pub dup: bool,
    /// Retain flag.
    pub retain: bool,
    /// Application payload.
    pub payload: Bytes,
}

impl PublishPacket {
    /// Message id, 0 when the publish is not acknowledged.
    pub fn message_id(&self) -> u16 {
        self.packet_id.unwrap_or(0)
    }
}

/// A control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Client connect request.
    Connect(ConnectPacket),
    /// Connect acknowledgement.
    ConnAck {
        /// Session present flag.
        session_present: bool,
        /// Outcome.
        code: ConnectReturnCode,
    },
    /// Application message.
    Publish(PublishPacket),
    /// QoS 1 acknowledgement.
    PubAck(u16),
    /// Subscribe request.
    Subscribe {
        /// Packet id.
        packet_id: u16,
        /// Topic filters with requested QoS.
        topics: Vec<(String, QoS)>,
    },
    /// Subscribe acknowledgement.
    SubAck {
        /// Packet id.
        packet_id: u16,
        /// Granted QoS per topic, or [`SUBACK_FAILURE`].
        return_codes: Vec<u8>,
    },
    /// Unsubscribe request.
    Unsubscribe {
        /// Packet id.
        packet_id: u16,
        /// Topic filters.
        topics: Vec<String>,
    },
    /// Unsubscribe acknowledgement.
    UnsubAck(u16),
    /// Keep alive ping.
    PingReq,
    /// Keep alive pong.
    PingResp,
    /// Client disconnect.
    Disconnect,
}

impl Packet {
    /// Packet type name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "CONNECT",
            Self::ConnAck { .. } => "CONNACK",
            Self::Publish(_) => "PUBLISH",
            Self::PubAck(_) => "PUBACK",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::SubAck { .. } => "SUBACK",
            Self::Unsubscribe { .. } => "UNSUBSCRIBE",
            Self::UnsubAck(_) => "UNSUBACK",
            Self::PingReq => "PINGREQ",
            Self::PingResp => "PINGRESP",
            Self::Disconnect => "DISCONNECT",
        }
    }

    /// CONNACK with the given code.
    pub fn connack(code: ConnectReturnCode) -> Self {
        Self::ConnAck {
            session_present: false,
            code,
        }
    }
}
