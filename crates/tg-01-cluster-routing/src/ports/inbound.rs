//! # Inbound Ports
//!
//! API trait defining what the Cluster Routing subsystem can do.

use shared_types::{EntityId, ServerAddress, ServerInstance, ServerType};

/// Cluster routing API - inbound port.
pub trait ClusterRoutingApi: Send + Sync {
    /// Address of this node.
    fn current_server(&self) -> ServerAddress;

    /// Owner of `entity_id` on the core ring.
    ///
    /// `None` means "handle locally": either this node owns the entity or no
    /// membership is known yet.
    fn resolve(&self, entity_id: &EntityId) -> Option<ServerAddress>;

    /// Same as [`resolve`](Self::resolve) on the ring of `server_type`.
    fn resolve_in(&self, server_type: ServerType, entity_id: &EntityId) -> Option<ServerAddress>;

    /// Discovery reported a new member.
    fn on_server_added(&self, instance: &ServerInstance);

    /// Discovery re-announced a member. Addresses never change, so no-op.
    fn on_server_updated(&self, instance: &ServerInstance);

    /// Discovery reported a member gone.
    fn on_server_removed(&self, instance: &ServerInstance);
}
