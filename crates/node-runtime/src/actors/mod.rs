//! # Device Actor Runtime
//!
//! One worker task per device, created on the first envelope for that
//! device. Workers own device state and talk to the rest of the node only
//! through messages: envelopes in, persistence enqueues and session replies
//! out.

mod device_actor;
pub mod ports;
pub mod records;
mod system;

pub use ports::{MockReplySink, ReplySink};
pub use records::{AttributeRecord, AttributeScope, TsRecord};
pub use system::DeviceActorSystem;

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Device actor errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActorError {
    /// No actor exists for the device on this node.
    #[error("Device {0} is not active on this node")]
    UnknownDevice(Uuid),

    /// The actor's mailbox is closed.
    #[error("Device actor {0} stopped")]
    Stopped(Uuid),

    /// No session of the device listens for RPC.
    #[error("Device {0} is not subscribed to RPC requests")]
    NotSubscribed(Uuid),

    /// The device did not answer in time.
    #[error("Device did not answer within {0:?}")]
    Timeout(Duration),

    /// The claim attempt was refused.
    #[error("Claim of device {0} rejected: {1}")]
    ClaimRejected(Uuid, &'static str),
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
