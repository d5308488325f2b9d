//! # Cluster Events
//!
//! Every event type that flows through the shared bus.

use serde::{Deserialize, Serialize};
use shared_types::entities::ServerInstance;
use uuid::Uuid;

/// All events that can be published to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClusterEvent {
    // =========================================================================
    // MEMBERSHIP (produced by discovery, consumed by the routing ring)
    // =========================================================================
    /// A member joined the cluster.
    ServerAdded(ServerInstance),

    /// A member re-announced itself. Its address never changes.
    ServerUpdated(ServerInstance),

    /// A member left the cluster.
    ServerRemoved(ServerInstance),

    // =========================================================================
    // SESSIONS (produced by the transport service)
    // =========================================================================
    /// A device session was registered on this node.
    SessionOpened {
        /// Session id.
        session_id: Uuid,
        /// Device the session speaks for.
        device_id: Uuid,
    },

    /// A device session was deregistered on this node.
    SessionClosed {
        /// Session id.
        session_id: Uuid,
        /// Device the session spoke for.
        device_id: Uuid,
    },
}

impl ClusterEvent {
    /// The topic this event is published under.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::ServerAdded(_) | Self::ServerUpdated(_) | Self::ServerRemoved(_) => {
                EventTopic::Membership
            }
            Self::SessionOpened { .. } | Self::SessionClosed { .. } => EventTopic::Session,
        }
    }
}

/// Event topics for filtering subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Cluster membership changes.
    Membership,
    /// Device session lifecycle.
    Session,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ClusterEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::entities::ServerType;

    fn added() -> ClusterEvent {
        ClusterEvent::ServerAdded(ServerInstance::new("10.0.0.2", 9090, ServerType::Core))
    }

    #[test]
    fn test_event_topic_mapping() {
        assert_eq!(added().topic(), EventTopic::Membership);
        let closed = ClusterEvent::SessionClosed {
            session_id: Uuid::new_v4(),
            device_id: Uuid::new_v4(),
        };
        assert_eq!(closed.topic(), EventTopic::Session);
    }

    #[test]
    fn test_filter_all() {
        assert!(EventFilter::all().matches(&added()));
        assert!(EventFilter::topics(vec![EventTopic::All]).matches(&added()));
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Session]);
        assert!(!filter.matches(&added()));
    }
}
