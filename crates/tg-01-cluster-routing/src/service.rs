//! # Cluster Routing Service
//!
//! Owns one [`ConsistentHashRing`] per [`ServerType`] and answers "which node
//! owns this entity".
//!
//! Readers call `ArcSwap::load` and search an immutable snapshot. Writers
//! take `update_lock`, clone the current ring, mutate the clone and store it.

use crate::algorithms::ConsistentHashRing;
use crate::domain::RoutingConfig;
use crate::ports::{ClusterRoutingApi, DiscoveryService};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use shared_types::{EntityId, ServerAddress, ServerInstance, ServerType};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Consistent-hash cluster routing.
pub struct ClusterRoutingService {
    config: RoutingConfig,
    current_server: ServerInstance,
    rings: [ArcSwap<ConsistentHashRing>; 2],
    update_lock: Mutex<()>,
}

impl ClusterRoutingService {
    /// Creates the service with only `current_server` known.
    pub fn new(config: RoutingConfig, current_server: ServerInstance) -> Self {
        let rings = ServerType::ALL
            .map(|_| ArcSwap::from_pointee(ConsistentHashRing::new(config)));
        let service = Self {
            config,
            current_server: current_server.clone(),
            rings,
            update_lock: Mutex::new(()),
        };
        service.add_node(&current_server);
        service
    }

    /// Creates the service seeded from discovery: this node first, then
    /// every other known member.
    pub fn init(config: RoutingConfig, discovery: &dyn DiscoveryService) -> Self {
        info!("[tg-01] Initializing cluster routing service");
        let service = Self::new(config, discovery.current_server());
        for instance in discovery.other_servers() {
            service.add_node(&instance);
        }
        service.log_rings();
        info!(
            hash_function = %config.hash_function,
            virtual_nodes = config.virtual_nodes,
            members = service.member_count(ServerType::Core),
            "[tg-01] Cluster routing service initialized"
        );
        service
    }

    /// Ring configuration.
    pub fn config(&self) -> RoutingConfig {
        self.config
    }

    fn ring(&self, server_type: ServerType) -> &ArcSwap<ConsistentHashRing> {
        &self.rings[server_type.ordinal()]
    }

    /// Places `instance` on the ring of its role.
    pub fn add_node(&self, instance: &ServerInstance) {
        let _guard = self.update_lock.lock();
        let slot = self.ring(instance.server_type);
        let mut ring = ConsistentHashRing::clone(&slot.load());
        let outcome = ring.add(instance);
        for loser in &outcome.displaced {
            warn!(
                winner = %instance,
                loser = %loser,
                "[tg-01] Virtual node collision, last writer wins"
            );
        }
        slot.store(Arc::new(ring));
        debug!(instance = %instance, positions = outcome.inserted, "[tg-01] Node added");
    }

    /// Removes `instance` from the ring of its role.
    pub fn remove_node(&self, instance: &ServerInstance) {
        let _guard = self.update_lock.lock();
        let slot = self.ring(instance.server_type);
        let mut ring = ConsistentHashRing::clone(&slot.load());
        let removed = ring.remove(instance);
        slot.store(Arc::new(ring));
        debug!(instance = %instance, positions = removed, "[tg-01] Node removed");
    }

    /// Positions of a ring as `(key, address)` pairs, in ring order.
    pub fn ring_snapshot(&self, server_type: ServerType) -> Vec<(i64, ServerAddress)> {
        self.ring(server_type)
            .load()
            .snapshot()
            .into_iter()
            .map(|(key, instance)| (key, instance.address()))
            .collect()
    }

    /// Distinct members on a ring.
    pub fn member_count(&self, server_type: ServerType) -> usize {
        self.ring(server_type).load().members().len()
    }

    fn log_rings(&self) {
        trace!("[tg-01] Consistent hash ring start");
        for server_type in ServerType::ALL {
            for (key, instance) in self.ring(server_type).load().snapshot() {
                trace!(server_type = %server_type, key, instance = %instance, "[tg-01] Ring entry");
            }
        }
        trace!("[tg-01] Consistent hash ring end");
    }
}

impl ClusterRoutingApi for ClusterRoutingService {
    fn current_server(&self) -> ServerAddress {
        self.current_server.address()
    }

    fn resolve(&self, entity_id: &EntityId) -> Option<ServerAddress> {
        self.resolve_in(ServerType::Core, entity_id)
    }

    fn resolve_in(&self, server_type: ServerType, entity_id: &EntityId) -> Option<ServerAddress> {
        let ring = self.ring(server_type).load();
        let owner = ring.locate(entity_id)?;
        if *owner == self.current_server {
            None
        } else {
            Some(owner.address())
        }
    }

    fn on_server_added(&self, instance: &ServerInstance) {
        info!(instance = %instance, "[tg-01] On server added event");
        self.add_node(instance);
        self.log_rings();
    }

    fn on_server_updated(&self, instance: &ServerInstance) {
        debug!(instance = %instance, "[tg-01] Ignoring server update event");
    }

    fn on_server_removed(&self, instance: &ServerInstance) {
        info!(instance = %instance, "[tg-01] On server removed event");
        self.remove_node(instance);
        self.log_rings();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::StaticDiscoveryService;
    use uuid::Uuid;

    fn node(i: u16) -> ServerInstance {
        ServerInstance::new(format!("10.0.0.{i}"), 7070, ServerType::Core)
    }

    fn entities(n: u64) -> Vec<EntityId> {
        (0..n)
            .map(|i| EntityId::device(Uuid::from_u64_pair(i, i ^ 0xDEAD_BEEF)))
            .collect()
    }

    #[test]
    fn test_single_node_resolves_locally() {
        let service = ClusterRoutingService::new(RoutingConfig::default(), node(1));
        for id in entities(100) {
            assert_eq!(service.resolve(&id), None);
        }
    }

    #[test]
    fn test_init_seeds_other_servers() {
        let discovery = StaticDiscoveryService::new(node(1), vec![node(2), node(3)]);
        let service = ClusterRoutingService::init(RoutingConfig::default(), &discovery);

        assert_eq!(service.member_count(ServerType::Core), 3);
        assert_eq!(service.ring_snapshot(ServerType::Core).len(), 48);

        let remote = entities(300)
            .iter()
            .filter_map(|id| service.resolve(id))
            .count();
        assert!(remote > 0);
        assert!(remote < 300);
    }

    #[test]
    fn test_resolve_never_returns_current_server() {
        let discovery = StaticDiscoveryService::new(node(1), vec![node(2)]);
        let service = ClusterRoutingService::init(RoutingConfig::default(), &discovery);
        let me = service.current_server();

        for id in entities(200) {
            if let Some(address) = service.resolve(&id) {
                assert_ne!(address, me);
                assert_eq!(address, node(2).address());
            }
        }
    }

    #[test]
    fn test_empty_ring_is_unresolvable() {
        let service = ClusterRoutingService::new(RoutingConfig::default(), node(1));
        let id = EntityId::device(Uuid::new_v4());
        // Nothing ever joined the transport ring.
        assert_eq!(service.resolve_in(ServerType::Transport, &id), None);
    }

    #[test]
    fn test_rings_are_per_server_type() {
        let service = ClusterRoutingService::new(RoutingConfig::default(), node(1));
        let transport = ServerInstance::new("10.0.1.1", 7070, ServerType::Transport);
        service.on_server_added(&transport);

        assert_eq!(service.member_count(ServerType::Core), 1);
        assert_eq!(service.member_count(ServerType::Transport), 1);

        let id = EntityId::device(Uuid::new_v4());
        assert_eq!(service.resolve(&id), None);
        assert_eq!(
            service.resolve_in(ServerType::Transport, &id),
            Some(transport.address())
        );
    }

    #[test]
    fn test_update_event_is_noop() {
        let service = ClusterRoutingService::new(RoutingConfig::default(), node(1));
        service.on_server_updated(&node(2));
        assert_eq!(service.member_count(ServerType::Core), 1);
    }

    #[test]
    fn test_removed_member_no_longer_owns_keys() {
        let discovery = StaticDiscoveryService::new(node(1), vec![node(2), node(3)]);
        let service = ClusterRoutingService::init(RoutingConfig::default(), &discovery);

        service.on_server_removed(&node(3));
        for id in entities(300) {
            assert_ne!(service.resolve(&id), Some(node(3).address()));
        }
    }

    #[test]
    fn test_concurrent_lookups_during_membership_churn() {
        let service = Arc::new(ClusterRoutingService::new(RoutingConfig::default(), node(1)));
        let ids = entities(64);

        let writer = {
            let service = Arc::clone(&service);
            std::thread::spawn(move || {
                for round in 0..50u16 {
                    let member = node(2 + round % 4);
                    service.add_node(&member);
                    service.remove_node(&member);
                }
            })
        };

        for _ in 0..200 {
            for id in &ids {
                if let Some(address) = service.resolve(id) {
                    assert_ne!(address, node(1).address());
                }
            }
        }
        writer.join().unwrap();
        assert_eq!(service.member_count(ServerType::Core), 1);
    }
}
