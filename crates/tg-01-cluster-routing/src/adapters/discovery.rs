//! Static Discovery Adapter
//!
//! Implements `DiscoveryService` from a fixed member list. Membership
//! changes after startup arrive through the shared bus instead.

use crate::ports::DiscoveryService;
use shared_types::ServerInstance;

/// Discovery backed by configuration.
#[derive(Debug, Clone)]
pub struct StaticDiscoveryService {
    current: ServerInstance,
    others: Vec<ServerInstance>,
}

impl StaticDiscoveryService {
    /// This node plus its configured peers. A peer equal to this node is dropped.
    pub fn new(current: ServerInstance, others: Vec<ServerInstance>) -> Self {
        let others = others.into_iter().filter(|o| *o != current).collect();
        Self { current, others }
    }
}

impl DiscoveryService for StaticDiscoveryService {
    fn current_server(&self) -> ServerInstance {
        self.current.clone()
    }

    fn other_servers(&self) -> Vec<ServerInstance> {
        self.others.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ServerType;

    #[test]
    fn test_self_is_not_a_peer() {
        let me = ServerInstance::new("10.0.0.1", 7070, ServerType::Core);
        let peer = ServerInstance::new("10.0.0.2", 7070, ServerType::Core);
        let discovery = StaticDiscoveryService::new(me.clone(), vec![me.clone(), peer.clone()]);

        assert_eq!(discovery.current_server(), me);
        assert_eq!(discovery.other_servers(), vec![peer]);
    }
}
