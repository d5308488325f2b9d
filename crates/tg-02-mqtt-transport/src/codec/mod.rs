//! # MQTT 3.1.1 Codec
//!
//! `tokio_util` framing for the control packets in [`crate::domain::packets`].
//!
//! Fixed header: packet type in the high nibble, flags in the low nibble,
//! then the remaining length as a 1 to 4 byte varint.

use crate::domain::{ConnectPacket, ConnectReturnCode, Packet, ProtocolError, PublishPacket, QoS};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Default cap on the remaining length of one packet.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 65_536;

const CONNECT: u8 = 1;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const PUBACK: u8 = 4;
const SUBSCRIBE: u8 = 8;
const SUBACK: u8 = 9;
const UNSUBSCRIBE: u8 = 10;
const UNSUBACK: u8 = 11;
const PINGREQ: u8 = 12;
const PINGRESP: u8 = 13;
const DISCONNECT: u8 = 14;

/// Frames a byte stream into MQTT packets.
#[derive(Debug, Clone)]
pub struct MqttCodec {
    max_payload_size: usize,
}

impl MqttCodec {
    /// Codec rejecting packets whose remaining length exceeds `max_payload_size`.
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
}

impl Default for MqttCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_SIZE)
    }
}

/// Reads the remaining length starting at `buf[1]`.
///
/// Returns `(length, header_size)` or `None` if more bytes are needed.
fn decode_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut multiplier = 1usize;
    let mut value = 0usize;
    for i in 0..4 {
        let Some(byte) = buf.get(1 + i) else {
            return Ok(None);
        };
        value += usize::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, 2 + i)));
        }
        multiplier *= 128;
    }
    Err(ProtocolError::Malformed("remaining length exceeds 4 bytes".into()))
}

fn encode_remaining_length(mut len: usize, dst: &mut BytesMut) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        dst.put_u8(byte);
        if len == 0 {
            break;
        }
    }
}

fn read_u8(buf: &mut Bytes) -> Result<u8, ProtocolError> {
    if !buf.has_remaining() {
        return Err(ProtocolError::Malformed("unexpected end of packet".into()));
    }
    Ok(buf.get_u8())
}

fn read_u16(buf: &mut Bytes) -> Result<u16, ProtocolError> {
    if buf.remaining() < 2 {
        return Err(ProtocolError::Malformed("unexpected end of packet".into()));
    }
    Ok(buf.get_u16())
}

fn read_binary(buf: &mut Bytes) -> Result<Bytes, ProtocolError> {
    let len = usize::from(read_u16(buf)?);
    if buf.remaining() < len {
        return Err(ProtocolError::Malformed("unexpected end of packet".into()));
    }
    Ok(buf.split_to(len))
}

fn read_string(buf: &mut Bytes) -> Result<String, ProtocolError> {
    let raw = read_binary(buf)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| ProtocolError::Malformed("invalid UTF-8 in string".into()))
}

fn put_binary(dst: &mut BytesMut, bytes: &[u8]) {
    dst.put_u16(bytes.len() as u16);
    dst.put_slice(bytes);
}

fn parse_connect(mut body: Bytes) -> Result<Packet, ProtocolError> {
    let protocol_name = read_string(&mut body)?;
    let level = read_u8(&mut body)?;
    match (protocol_name.as_str(), level) {
        ("MQTT", 4) | ("MQIsdp", 3) => {}
        _ => return Err(ProtocolError::UnsupportedProtocolLevel(level)),
    }
    let flags = read_u8(&mut body)?;
    if flags & 0x01 != 0 {
        return Err(ProtocolError::Malformed("reserved connect flag set".into()));
    }
    let keep_alive = read_u16(&mut body)?;
    let client_id = read_string(&mut body)?;

    if flags & 0x04 != 0 {
        // Will topic and message are read and dropped.
        read_string(&mut body)?;
        read_binary(&mut body)?;
    }
    let username = if flags & 0x80 != 0 {
        Some(read_string(&mut body)?)
    } else {
        None
    };
    let password = if flags & 0x40 != 0 {
        Some(read_binary(&mut body)?)
    } else {
        None
    };

    Ok(Packet::Connect(ConnectPacket {
        client_id,
        keep_alive,
        clean_session: flags & 0x02 != 0,
        username,
        password,
    }))
}

fn parse_publish(flags: u8, mut body: Bytes) -> Result<Packet, ProtocolError> {
    let qos_bits = (flags >> 1) & 0x03;
    let qos = QoS::from_u8(qos_bits).ok_or(ProtocolError::InvalidQos(qos_bits))?;
    let topic = read_string(&mut body)?;
    if topic.contains(['+', '#']) {
        return Err(ProtocolError::Malformed("wildcard in publish topic".into()));
    }
    let packet_id = match qos {
        QoS::AtMostOnce => None,
        _ => Some(read_u16(&mut body)?),
    };
    Ok(Packet::Publish(PublishPacket {
        topic,
        qos,
        packet_id,
        dup: flags & 0x08 != 0,
        retain: flags & 0x01 != 0,
        payload: body,
    }))
}

fn parse_subscribe(mut body: Bytes) -> Result<Packet, ProtocolError> {
    let packet_id = read_u16(&mut body)?;
    let mut topics = Vec::new();
    while body.has_remaining() {
        let topic = read_string(&mut body)?;
        let requested = read_u8(&mut body)? & 0x03;
        let qos = QoS::from_u8(requested).ok_or(ProtocolError::InvalidQos(requested))?;
        topics.push((topic, qos));
    }
    if topics.is_empty() {
        return Err(ProtocolError::Malformed("subscribe without topics".into()));
    }
    Ok(Packet::Subscribe { packet_id, topics })
}

fn parse_unsubscribe(mut body: Bytes) -> Result<Packet, ProtocolError> {
    let packet_id = read_u16(&mut body)?;
    let mut topics = Vec::new();
    while body.has_remaining() {
        topics.push(read_string(&mut body)?);
    }
    if topics.is_empty() {
        return Err(ProtocolError::Malformed("unsubscribe without topics".into()));
    }
    Ok(Packet::Unsubscribe { packet_id, topics })
}

fn parse_connack(mut body: Bytes) -> Result<Packet, ProtocolError> {
    let ack_flags = read_u8(&mut body)?;
    let raw = read_u8(&mut body)?;
    let code = ConnectReturnCode::from_u8(raw)
        .ok_or_else(|| ProtocolError::Malformed(format!("unknown connack code {raw}")))?;
    Ok(Packet::ConnAck {
        session_present: ack_flags & 0x01 != 0,
        code,
    })
}

fn parse_suback(mut body: Bytes) -> Result<Packet, ProtocolError> {
    let packet_id = read_u16(&mut body)?;
    Ok(Packet::SubAck {
        packet_id,
        return_codes: body.to_vec(),
    })
}

impl Decoder for MqttCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, ProtocolError> {
        if src.is_empty() {
            return Ok(None);
        }
        let Some((remaining, header_len)) = decode_remaining_length(src)? else {
            return Ok(None);
        };
        if remaining > self.max_payload_size {
            return Err(ProtocolError::PacketTooLarge {
                size: remaining,
                max: self.max_payload_size,
            });
        }
        let frame_len = header_len + remaining;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len).freeze();
        let first = frame.get_u8();
        frame.advance(header_len - 1);
        let packet_type = first >> 4;
        let flags = first & 0x0F;

        let packet = match packet_type {
            CONNECT => parse_connect(frame)?,
            CONNACK => parse_connack(frame)?,
            PUBLISH => parse_publish(flags, frame)?,
            PUBACK => Packet::PubAck(read_u16(&mut frame)?),
            SUBSCRIBE => parse_subscribe(frame)?,
            SUBACK => parse_suback(frame)?,
            UNSUBSCRIBE => parse_unsubscribe(frame)?,
            UNSUBACK => Packet::UnsubAck(read_u16(&mut frame)?),
            PINGREQ => Packet::PingReq,
            PINGRESP => Packet::PingResp,
            DISCONNECT => Packet::Disconnect,
            other => return Err(ProtocolError::UnsupportedPacketType(other)),
        };
        Ok(Some(packet))
    }
}

impl Encoder<Packet> for MqttCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        let first = match &packet {
            Packet::Connect(connect) => {
                put_binary(&mut body, b"MQTT");
                body.put_u8(4);
                let mut flags = 0u8;
                if connect.clean_session {
                    flags |= 0x02;
                }
                if connect.username.is_some() {
                    flags |= 0x80;
                }
                if connect.password.is_some() {
                    flags |= 0x40;
                }
                body.put_u8(flags);
                body.put_u16(connect.keep_alive);
                put_binary(&mut body, connect.client_id.as_bytes());
                if let Some(username) = &connect.username {
                    put_binary(&mut body, username.as_bytes());
                }
                if let Some(password) = &connect.password {
                    put_binary(&mut body, password);
                }
                CONNECT << 4
            }
            Packet::ConnAck {
                session_present,
                code,
            } => {
                body.put_u8(u8::from(*session_present));
                body.put_u8(*code as u8);
                CONNACK << 4
            }
            Packet::Publish(publish) => {
                put_binary(&mut body, publish.topic.as_bytes());
                if publish.qos != QoS::AtMostOnce {
                    body.put_u16(publish.message_id());
                }
                body.put_slice(&publish.payload);
                let mut flags = publish.qos.as_u8() << 1;
                if publish.dup {
                    flags |= 0x08;
                }
                if publish.retain {
                    flags |= 0x01;
                }
                (PUBLISH << 4) | flags
            }
            Packet::PubAck(id) => {
                body.put_u16(*id);
                PUBACK << 4
            }
            Packet::Subscribe { packet_id, topics } => {
                body.put_u16(*packet_id);
                for (topic, qos) in topics {
                    put_binary(&mut body, topic.as_bytes());
                    body.put_u8(qos.as_u8());
                }
                (SUBSCRIBE << 4) | 0x02
            }
            Packet::SubAck {
                packet_id,
                return_codes,
            } => {
                body.put_u16(*packet_id);
                body.put_slice(return_codes);
                SUBACK << 4
            }
            Packet::Unsubscribe { packet_id, topics } => {
                body.put_u16(*packet_id);
                for topic in topics {
                    put_binary(&mut body, topic.as_bytes());
                }
                (UNSUBSCRIBE << 4) | 0x02
            }
            Packet::UnsubAck(id) => {
                body.put_u16(*id);
                UNSUBACK << 4
            }
            Packet::PingReq => PINGREQ << 4,
            Packet::PingResp => PINGRESP << 4,
            Packet::Disconnect => DISCONNECT << 4,
        };

        dst.reserve(body.len() + 5);
        dst.put_u8(first);
        encode_remaining_length(body.len(), dst);
        dst.extend_from_slice(&body);
        Ok(())
    }
}
