//! # Event Subscriber
//!
//! Receiving side of the bus. Each subscription owns a broadcast receiver
//! and drops events outside its filter.

use crate::events::{ClusterEvent, EventFilter};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

/// Errors from [`Subscription::try_recv`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Every publisher handle is gone.
    #[error("Event bus closed")]
    Closed,
}

/// Filtered view of the bus.
pub struct Subscription {
    receiver: broadcast::Receiver<ClusterEvent>,
    filter: EventFilter,
    skipped: u64,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<ClusterEvent>, filter: EventFilter) -> Self {
        Self {
            receiver,
            filter,
            skipped: 0,
        }
    }

    /// Next event accepted by the filter. `None` once the bus is dropped.
    ///
    /// A subscriber that fell behind skips ahead to the oldest buffered
    /// event; the gap is logged and counted in [`skipped`](Self::skipped).
    pub async fn recv(&mut self) -> Option<ClusterEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(count)) => self.record_gap(count),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Like [`recv`](Self::recv) but returns `Ok(None)` instead of waiting.
    pub fn try_recv(&mut self) -> Result<Option<ClusterEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(TryRecvError::Lagged(count)) => self.record_gap(count),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Closed) => return Err(SubscriptionError::Closed),
            }
        }
    }

    /// Events lost because this subscriber lagged.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// The filter of this subscription.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    fn record_gap(&mut self, count: u64) {
        self.skipped += count;
        warn!(topics = ?self.filter.topics, lagged = count, "Subscriber lagged, events dropped");
    }
}
