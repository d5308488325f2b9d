//! # Shared Bus - In-Process Event Bus
//!
//! Carries cluster membership changes from the discovery collaborator to the
//! routing ring, and session lifecycle notifications from the transport to
//! whoever tracks them.
//!
//! ```text
//! ┌──────────────┐   publish()   ┌──────────────┐  subscribe()  ┌──────────────┐
//! │  Discovery   │ ────────────▶ │  Event Bus   │ ────────────▶ │ Routing Ring │
//! └──────────────┘               └──────────────┘               └──────────────┘
//! ```
//!
//! Delivery is best effort: a subscriber that falls more than the channel
//! capacity behind skips the oldest events and logs the gap.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{ClusterEvent, EventFilter, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }
}
