//! # Core Domain Entities
//!
//! Identifiers and topology types used across the gateway.
//!
//! ## Clusters
//!
//! - **Identity**: `EntityId`, `EntityType`
//! - **Topology**: `ServerType`, `ServerAddress`, `ServerInstance`
//! - **Devices & Sessions**: `DeviceInfo`, `DeviceKind`, `SessionInfo`

use crate::errors::TypeParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Kind of entity an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// A tenant owning devices and customers.
    Tenant,
    /// A customer inside a tenant.
    Customer,
    /// A platform user.
    User,
    /// A device (including gateways and their children).
    Device,
    /// An asset grouping devices.
    Asset,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tenant => "TENANT",
            Self::Customer => "CUSTOMER",
            Self::User => "USER",
            Self::Device => "DEVICE",
            Self::Asset => "ASSET",
        };
        f.write_str(name)
    }
}

impl FromStr for EntityType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TENANT" => Ok(Self::Tenant),
            "CUSTOMER" => Ok(Self::Customer),
            "USER" => Ok(Self::User),
            "DEVICE" => Ok(Self::Device),
            "ASSET" => Ok(Self::Asset),
            _ => Err(TypeParseError::UnknownEntityType(s.to_string())),
        }
    }
}

/// Opaque 128-bit identifier with a type tag. Used as the sharding key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    /// What the identifier refers to.
    pub entity_type: EntityType,
    /// The 128-bit identifier.
    pub id: Uuid,
}

impl EntityId {
    /// Creates a new typed identifier.
    pub fn new(entity_type: EntityType, id: Uuid) -> Self {
        Self { entity_type, id }
    }

    /// Shorthand for a device identifier.
    pub fn device(id: Uuid) -> Self {
        Self::new(EntityType::Device, id)
    }

    /// Shorthand for a tenant identifier.
    pub fn tenant(id: Uuid) -> Self {
        Self::new(EntityType::Tenant, id)
    }

    /// Shorthand for a customer identifier.
    pub fn customer(id: Uuid) -> Self {
        Self::new(EntityType::Customer, id)
    }

    /// The identifier split into most and least significant 64-bit words.
    pub fn words(&self) -> (i64, i64) {
        let (msb, lsb) = self.id.as_u64_pair();
        (msb as i64, lsb as i64)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.entity_type, self.id)
    }
}

// =============================================================================
// CLUSTER B: TOPOLOGY
// =============================================================================

/// Role a cluster member plays. Each role gets its own hash ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ServerType {
    /// Owns device actors and business state.
    #[default]
    Core,
    /// Terminates device protocol connections.
    Transport,
}

impl ServerType {
    /// All roles, in ordinal order.
    pub const ALL: [ServerType; 2] = [ServerType::Core, ServerType::Transport];

    /// Index of the role, used to address per-role arrays.
    pub fn ordinal(self) -> usize {
        match self {
            Self::Core => 0,
            Self::Transport => 1,
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => f.write_str("CORE"),
            Self::Transport => f.write_str("TRANSPORT"),
        }
    }
}

impl FromStr for ServerType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CORE" => Ok(Self::Core),
            "TRANSPORT" => Ok(Self::Transport),
            _ => Err(TypeParseError::UnknownServerType(s.to_string())),
        }
    }
}

/// Network address of a cluster member, as handed to the RPC layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    /// Host name or IP.
    pub host: String,
    /// RPC port.
    pub port: u16,
    /// Role of the member.
    pub server_type: ServerType,
}

impl ServerAddress {
    /// Creates a new address.
    pub fn new(host: impl Into<String>, port: u16, server_type: ServerType) -> Self {
        Self {
            host: host.into(),
            port,
            server_type,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A cluster member as reported by discovery.
///
/// Equality and hashing use `host` and `port` only: the same endpoint
/// reported twice with a different key is the same member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInstance {
    /// Host name or IP.
    pub host: String,
    /// RPC port.
    pub port: u16,
    /// Role of the member.
    pub server_type: ServerType,
    /// Stable key, `host:port` unless discovery supplies one.
    pub server_key: String,
}

impl ServerInstance {
    /// Creates an instance whose key is `host:port`.
    pub fn new(host: impl Into<String>, port: u16, server_type: ServerType) -> Self {
        let host = host.into();
        let server_key = format!("{host}:{port}");
        Self {
            host,
            port,
            server_type,
            server_key,
        }
    }

    /// The address the RPC layer dials.
    pub fn address(&self) -> ServerAddress {
        ServerAddress::new(self.host.clone(), self.port, self.server_type)
    }
}

impl PartialEq for ServerInstance {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for ServerInstance {}

impl Hash for ServerInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for ServerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.host, self.port, self.server_type)
    }
}

// =============================================================================
// CLUSTER C: DEVICES & SESSIONS
// =============================================================================

/// Whether a device relays traffic for other devices.
///
/// Resolved once when the session opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeviceKind {
    /// A device speaking for itself only.
    #[default]
    Standard,
    /// A protocol gateway multiplexing child devices over one connection.
    Gateway,
}

impl DeviceKind {
    /// Reads the `gateway` flag from a device's free-form additional info.
    pub fn from_additional_info(info: &serde_json::Value) -> Self {
        match info.get("gateway").and_then(serde_json::Value::as_bool) {
            Some(true) => Self::Gateway,
            _ => Self::Standard,
        }
    }

    /// True for gateways.
    pub fn is_gateway(self) -> bool {
        matches!(self, Self::Gateway)
    }
}

/// Identity of a device as returned by credential validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Assigned customer, if any.
    pub customer_id: Option<Uuid>,
    /// Device identifier.
    pub device_id: Uuid,
    /// Human readable name, unique inside a tenant.
    pub device_name: String,
    /// Device profile/type name.
    pub device_type: String,
    /// Standard device or gateway.
    pub kind: DeviceKind,
}

/// Outcome of a credential validation request.
///
/// `device_info == None` means the credentials were rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredentialsResult {
    /// Identity of the authenticated device.
    pub device_info: Option<DeviceInfo>,
    /// Raw credentials value echoed back by the validator.
    pub credentials: Option<String>,
}

impl DeviceCredentialsResult {
    /// A successful validation.
    pub fn found(device_info: DeviceInfo) -> Self {
        Self {
            device_info: Some(device_info),
            credentials: None,
        }
    }

    /// A rejected validation.
    pub fn rejected() -> Self {
        Self::default()
    }
}

/// Session identity attached to every message a connection produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Stable for the connection lifetime.
    pub session_id: Uuid,
    /// Node id of the transport that owns the connection.
    pub node_id: String,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Assigned customer, if any.
    pub customer_id: Option<Uuid>,
    /// Device the session speaks for.
    pub device_id: Uuid,
    /// Device name.
    pub device_name: String,
    /// Device type.
    pub device_type: String,
}

impl SessionInfo {
    /// Builds a fresh session for an authenticated device.
    pub fn for_device(node_id: impl Into<String>, device: &DeviceInfo) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            node_id: node_id.into(),
            tenant_id: device.tenant_id,
            customer_id: device.customer_id,
            device_id: device.device_id,
            device_name: device.device_name.clone(),
            device_type: device.device_type.clone(),
        }
    }

    /// Routing key of the session's device.
    pub fn entity_id(&self) -> EntityId {
        EntityId::device(self.device_id)
    }
}
