//! # Message Router
//!
//! Picks local hand-off or remote send for each transport envelope, based on
//! the owner of the envelope's entity id.

use crate::domain::RoutingError;
use crate::ports::{ClusterRoutingApi, LocalDispatcher, RemoteSender};
use shared_types::{ServerAddress, TransportToDeviceMsg};
use std::sync::Arc;
use tracing::trace;

/// Where an envelope went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Handled by this node's actor runtime.
    Local,
    /// Sent to the owning node.
    Remote(ServerAddress),
}

/// Routes envelopes to the node that owns their entity.
#[derive(Clone)]
pub struct MessageRouter {
    routing: Arc<dyn ClusterRoutingApi>,
    local: Arc<dyn LocalDispatcher>,
    remote: Arc<dyn RemoteSender>,
}

impl MessageRouter {
    /// Creates a router.
    pub fn new(
        routing: Arc<dyn ClusterRoutingApi>,
        local: Arc<dyn LocalDispatcher>,
        remote: Arc<dyn RemoteSender>,
    ) -> Self {
        Self {
            routing,
            local,
            remote,
        }
    }

    /// Forwards `msg` to its owner. An unresolvable owner means local.
    pub async fn route(&self, msg: TransportToDeviceMsg) -> Result<RouteDecision, RoutingError> {
        let entity_id = msg.entity_id();
        match self.routing.resolve(&entity_id) {
            Some(address) => {
                trace!(entity = %entity_id, target = %address, kind = msg.payload.kind(), "[tg-01] Remote route");
                self.remote.send(&address, msg).await?;
                Ok(RouteDecision::Remote(address))
            }
            None => {
                trace!(entity = %entity_id, kind = msg.payload.kind(), "[tg-01] Local route");
                self.local.tell(msg).await?;
                Ok(RouteDecision::Local)
            }
        }
    }
}
