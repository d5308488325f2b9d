//! Frame codec for cluster RPC.

use super::RpcError;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use shared_types::{DeviceToTransportMsg, TransportToDeviceMsg};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Largest accepted frame body.
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Everything one node sends another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcMessage {
    /// Envelope for a device actor owned by the receiver.
    ToDevice(TransportToDeviceMsg),
    /// Reply for a session held by the receiver.
    ToTransport(DeviceToTransportMsg),
}

/// Length-prefixed bincode frames.
#[derive(Debug)]
pub struct RpcCodec {
    frames: LengthDelimitedCodec,
}

impl Default for RpcCodec {
    fn default() -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
        }
    }
}

impl Decoder for RpcCodec {
    type Item = RpcMessage;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.frames.decode(src)? {
            Some(frame) => Ok(Some(bincode::deserialize(&frame)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<RpcMessage> for RpcCodec {
    type Error = RpcError;

    fn encode(&mut self, item: RpcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = bincode::serialize(&item)?;
        self.frames.encode(Bytes::from(body), dst)?;
        Ok(())
    }
}
