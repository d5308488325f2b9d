//! Membership Listener Adapter
//!
//! Subscribes to membership events on the shared bus and applies them to a
//! [`ClusterRoutingApi`]. One listener per service keeps ring mutations on a
//! single path.

use crate::ports::ClusterRoutingApi;
use shared_bus::{ClusterEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription};
use std::sync::Arc;
use tracing::info;

/// Applies bus membership events to the ring.
pub struct MembershipListener {
    routing: Arc<dyn ClusterRoutingApi>,
    subscription: Subscription,
}

impl MembershipListener {
    /// Subscribes to membership events. Events published before this call
    /// are not seen.
    pub fn new(routing: Arc<dyn ClusterRoutingApi>, bus: &InMemoryEventBus) -> Self {
        let subscription = bus.subscribe(EventFilter::topics(vec![EventTopic::Membership]));
        Self {
            routing,
            subscription,
        }
    }

    /// Applies one event. Non membership events are ignored.
    pub fn apply(&self, event: &ClusterEvent) {
        match event {
            ClusterEvent::ServerAdded(instance) => self.routing.on_server_added(instance),
            ClusterEvent::ServerUpdated(instance) => self.routing.on_server_updated(instance),
            ClusterEvent::ServerRemoved(instance) => self.routing.on_server_removed(instance),
            ClusterEvent::SessionOpened { .. } | ClusterEvent::SessionClosed { .. } => {}
        }
    }

    /// Runs until the bus is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.subscription.recv().await {
            self.apply(&event);
        }
        info!("[tg-01] Event bus closed, membership listener stopped");
    }
}
