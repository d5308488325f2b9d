//! # Transport Envelope
//!
//! Messages exchanged between the transport layer and the device actors.
//!
//! - [`TransportToDeviceMsg`]: `{session_info, payload}` produced by a
//!   session and routed by device id, locally or to a remote node.
//! - [`DeviceToTransportMsg`]: replies and notifications a device actor
//!   pushes back to the session that owns the connection.

use crate::entities::{EntityId, SessionInfo};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// KEY / VALUE DATA
// =============================================================================

/// A typed value. JSON objects and arrays are kept as their string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KvValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Long(i64),
    /// Floating point.
    Double(f64),
    /// Text.
    Str(String),
    /// Serialized JSON object or array.
    Json(String),
}

/// A single named value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Attribute or telemetry key.
    pub key: String,
    /// Value.
    pub value: KvValue,
}

impl KeyValue {
    /// Creates a key/value pair.
    pub fn new(key: impl Into<String>, value: KvValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Values sharing one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsKvList {
    /// Milliseconds since the epoch.
    pub ts: i64,
    /// Values recorded at `ts`.
    pub kv: Vec<KeyValue>,
}

// =============================================================================
// TRANSPORT -> DEVICE
// =============================================================================

/// Session lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Connection authenticated.
    Open,
    /// Connection gone.
    Closed,
}

/// Time series upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostTelemetryMsg {
    /// One entry per timestamp.
    pub ts_kv_list: Vec<TsKvList>,
}

/// Client side attribute upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostAttributeMsg {
    /// Attributes to store.
    pub kv: Vec<KeyValue>,
}

/// Device asking for its attribute values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAttributeRequestMsg {
    /// Correlates the response.
    pub request_id: i32,
    /// Client scope keys, empty means all.
    pub client_keys: Vec<String>,
    /// Shared scope keys, empty means all.
    pub shared_keys: Vec<String>,
}

/// Attribute update subscription toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeToAttributeUpdatesMsg {
    /// True to cancel.
    pub unsubscribe: bool,
}

/// Server side RPC subscription toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeToRpcMsg {
    /// True to cancel.
    pub unsubscribe: bool,
}

/// Device answering a server initiated RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToDeviceRpcResponseMsg {
    /// Id of the request being answered.
    pub request_id: i32,
    /// Response body.
    pub payload: String,
}

/// Device initiated RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToServerRpcRequestMsg {
    /// Correlates the response.
    pub request_id: i32,
    /// Method to invoke.
    pub method_name: String,
    /// Serialized JSON parameters.
    pub params: String,
}

/// Device claiming request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDeviceMsg {
    /// Device to claim.
    pub device_id: Uuid,
    /// Secret the claimer must present.
    pub secret_key: String,
    /// How long the claim stays open.
    pub duration_ms: i64,
}

/// Current subscription state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfoMsg {
    /// Subscribed to attribute updates.
    pub attribute_subscription: bool,
    /// Subscribed to server side RPC.
    pub rpc_subscription: bool,
    /// Last time the session showed activity, millis since the epoch.
    pub last_activity_time: i64,
}

/// Payload carried by a [`TransportToDeviceMsg`]. Exactly one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransportPayload {
    /// Session opened or closed.
    SessionEvent(SessionEvent),
    /// Telemetry upload.
    PostTelemetry(PostTelemetryMsg),
    /// Attribute upload.
    PostAttributes(PostAttributeMsg),
    /// Attribute read.
    GetAttributes(GetAttributeRequestMsg),
    /// Attribute subscription change.
    SubscribeToAttributes(SubscribeToAttributeUpdatesMsg),
    /// RPC subscription change.
    SubscribeToRpc(SubscribeToRpcMsg),
    /// Answer to a server side RPC.
    ToDeviceRpcResponse(ToDeviceRpcResponseMsg),
    /// Device side RPC request.
    ToServerRpcRequest(ToServerRpcRequestMsg),
    /// Claim request.
    ClaimDevice(ClaimDeviceMsg),
    /// Subscription state and activity report.
    SubscriptionInfo(SubscriptionInfoMsg),
}

impl TransportPayload {
    /// Short name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionEvent(_) => "session_event",
            Self::PostTelemetry(_) => "post_telemetry",
            Self::PostAttributes(_) => "post_attributes",
            Self::GetAttributes(_) => "get_attributes",
            Self::SubscribeToAttributes(_) => "subscribe_attributes",
            Self::SubscribeToRpc(_) => "subscribe_rpc",
            Self::ToDeviceRpcResponse(_) => "to_device_rpc_response",
            Self::ToServerRpcRequest(_) => "to_server_rpc_request",
            Self::ClaimDevice(_) => "claim_device",
            Self::SubscriptionInfo(_) => "subscription_info",
        }
    }
}

/// Envelope routed to the device actor that owns `session_info.device_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportToDeviceMsg {
    /// Session the message originates from.
    pub session_info: SessionInfo,
    /// The single payload.
    pub payload: TransportPayload,
}

impl TransportToDeviceMsg {
    /// Wraps a payload for a session.
    pub fn new(session_info: SessionInfo, payload: TransportPayload) -> Self {
        Self {
            session_info,
            payload,
        }
    }

    /// Routing key.
    pub fn entity_id(&self) -> EntityId {
        self.session_info.entity_id()
    }
}

// =============================================================================
// DEVICE -> TRANSPORT
// =============================================================================

/// Shared attributes changed on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeUpdateNotificationMsg {
    /// New or changed shared attributes.
    pub shared_updated: Vec<KeyValue>,
    /// Removed shared attribute keys.
    pub shared_deleted: Vec<String>,
}

/// Reply to a [`GetAttributeRequestMsg`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetAttributeResponseMsg {
    /// Id of the request being answered.
    pub request_id: i32,
    /// Client scope values.
    pub client_attributes: Vec<KeyValue>,
    /// Shared scope values.
    pub shared_attributes: Vec<KeyValue>,
    /// Set when the read failed.
    pub error: Option<String>,
}

/// Server initiated RPC for a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToDeviceRpcRequestMsg {
    /// Correlates the device's answer.
    pub request_id: i32,
    /// Method to invoke.
    pub method_name: String,
    /// Serialized JSON parameters.
    pub params: String,
}

/// Reply to a [`ToServerRpcRequestMsg`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToServerRpcResponseMsg {
    /// Id of the request being answered.
    pub request_id: i32,
    /// Response body.
    pub payload: String,
    /// Set when the call failed.
    pub error: Option<String>,
}

/// Messages a device actor sends back to a live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToTransportMsg {
    /// Shared attribute change notification.
    AttributeUpdate(AttributeUpdateNotificationMsg),
    /// Attribute read result.
    GetAttributesResponse(GetAttributeResponseMsg),
    /// Server to device RPC.
    ToDeviceRpcRequest(ToDeviceRpcRequestMsg),
    /// Answer to a device initiated RPC.
    ToServerRpcResponse(ToServerRpcResponseMsg),
    /// The server closed the session.
    SessionClose {
        /// Reason for the close.
        message: String,
    },
}

/// A [`ToTransportMsg`] addressed to one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceToTransportMsg {
    /// Target session.
    pub session_id: Uuid,
    /// Device the session belongs to.
    pub device_id: Uuid,
    /// The message.
    pub msg: ToTransportMsg,
}
