//! # Outbound Ports
//!
//! Traits for external dependencies: discovery, the local actor runtime and
//! the cluster RPC client.

use crate::domain::RoutingError;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{ServerAddress, ServerInstance, TransportToDeviceMsg};

/// Discovery service - outbound port.
///
/// Queried once at startup. Later changes arrive as bus events.
pub trait DiscoveryService: Send + Sync {
    /// This node.
    fn current_server(&self) -> ServerInstance;

    /// Every other known member.
    fn other_servers(&self) -> Vec<ServerInstance>;
}

/// Local actor runtime - outbound port.
#[async_trait]
pub trait LocalDispatcher: Send + Sync {
    /// Hand the envelope to the in-process owner of its entity.
    async fn tell(&self, msg: TransportToDeviceMsg) -> Result<(), RoutingError>;
}

/// Cluster RPC client - outbound port.
#[async_trait]
pub trait RemoteSender: Send + Sync {
    /// Serialize and send the envelope to the node at `address`.
    async fn send(&self, address: &ServerAddress, msg: TransportToDeviceMsg)
        -> Result<(), RoutingError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mock local dispatcher recording every envelope.
#[derive(Default)]
pub struct MockLocalDispatcher {
    /// Received envelopes, in order.
    pub received: Mutex<Vec<TransportToDeviceMsg>>,
    /// Fail every call when set.
    pub fail: bool,
}

#[async_trait]
impl LocalDispatcher for MockLocalDispatcher {
    async fn tell(&self, msg: TransportToDeviceMsg) -> Result<(), RoutingError> {
        if self.fail {
            return Err(RoutingError::LocalDispatch("mock failure".into()));
        }
        self.received.lock().push(msg);
        Ok(())
    }
}

/// Mock remote sender recording every envelope with its target.
#[derive(Default)]
pub struct MockRemoteSender {
    /// Sent envelopes with their targets, in order.
    pub sent: Mutex<Vec<(ServerAddress, TransportToDeviceMsg)>>,
    /// Fail every call when set.
    pub fail: bool,
}

#[async_trait]
impl RemoteSender for MockRemoteSender {
    async fn send(
        &self,
        address: &ServerAddress,
        msg: TransportToDeviceMsg,
    ) -> Result<(), RoutingError> {
        if self.fail {
            return Err(RoutingError::RemoteSend {
                address: address.clone(),
                reason: "mock failure".into(),
            });
        }
        self.sent.lock().push((address.clone(), msg));
        Ok(())
    }
}
