//! # Topics
//!
//! The fixed v1 topic namespace for devices and gateways.

/// Root of every device topic.
pub const BASE_DEVICE_API_TOPIC: &str = "v1/devices/me";
/// Device telemetry upload.
pub const DEVICE_TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";
/// Device attribute upload and shared attribute notifications.
pub const DEVICE_ATTRIBUTES_TOPIC: &str = "v1/devices/me/attributes";
/// Attribute read request prefix, followed by the request id.
pub const DEVICE_ATTRIBUTES_REQUEST_TOPIC_PREFIX: &str = "v1/devices/me/attributes/request/";
/// Attribute read response prefix, followed by the request id.
pub const DEVICE_ATTRIBUTES_RESPONSE_TOPIC_PREFIX: &str = "v1/devices/me/attributes/response/";
/// Subscription filter for attribute read responses.
pub const DEVICE_ATTRIBUTES_RESPONSES_TOPIC: &str = "v1/devices/me/attributes/response/+";
/// Device RPC request prefix (both directions), followed by the request id.
pub const DEVICE_RPC_REQUESTS_TOPIC: &str = "v1/devices/me/rpc/request/";
/// Subscription filter for server side RPC requests.
pub const DEVICE_RPC_REQUESTS_SUB_TOPIC: &str = "v1/devices/me/rpc/request/+";
/// Device RPC response prefix (both directions), followed by the request id.
pub const DEVICE_RPC_RESPONSE_TOPIC: &str = "v1/devices/me/rpc/response/";
/// Subscription filter for responses to device side RPC.
pub const DEVICE_RPC_RESPONSE_SUB_TOPIC: &str = "v1/devices/me/rpc/response/+";
/// Device claiming.
pub const DEVICE_CLAIM_TOPIC: &str = "v1/devices/me/claim";

/// Root of every gateway topic.
pub const BASE_GATEWAY_API_TOPIC: &str = "v1/gateway";
/// Child device connected behind the gateway.
pub const GATEWAY_CONNECT_TOPIC: &str = "v1/gateway/connect";
/// Child device disconnected.
pub const GATEWAY_DISCONNECT_TOPIC: &str = "v1/gateway/disconnect";
/// Child attribute upload and shared attribute notifications.
pub const GATEWAY_ATTRIBUTES_TOPIC: &str = "v1/gateway/attributes";
/// Child telemetry upload.
pub const GATEWAY_TELEMETRY_TOPIC: &str = "v1/gateway/telemetry";
/// Child claiming.
pub const GATEWAY_CLAIM_TOPIC: &str = "v1/gateway/claim";
/// Child RPC (requests down, responses up).
pub const GATEWAY_RPC_TOPIC: &str = "v1/gateway/rpc";
/// Child attribute read request.
pub const GATEWAY_ATTRIBUTES_REQUEST_TOPIC: &str = "v1/gateway/attributes/request";
/// Child attribute read response.
pub const GATEWAY_ATTRIBUTES_RESPONSE_TOPIC: &str = "v1/gateway/attributes/response";

/// Subscription filters that are accepted without side effects.
pub const PASSIVE_SUBSCRIPTION_TOPICS: [&str; 5] = [
    DEVICE_RPC_RESPONSE_SUB_TOPIC,
    GATEWAY_ATTRIBUTES_TOPIC,
    GATEWAY_RPC_TOPIC,
    GATEWAY_ATTRIBUTES_RESPONSE_TOPIC,
    DEVICE_ATTRIBUTES_RESPONSES_TOPIC,
];
