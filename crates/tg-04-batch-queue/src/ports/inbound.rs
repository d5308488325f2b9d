//! # Inbound Port
//!
//! What producers call to hand items to a queue.

use crate::domain::{QueueError, QueueStatsSnapshot};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Resolves once the item's batch has been written or has failed.
///
/// Resolves to [`QueueError::Shutdown`] when the queue stopped first.
#[derive(Debug)]
pub struct CompletionHandle {
    rx: oneshot::Receiver<Result<(), QueueError>>,
}

impl CompletionHandle {
    /// Creates a handle and the sender the worker completes it through.
    pub fn channel() -> (oneshot::Sender<Result<(), QueueError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A handle that is already resolved.
    pub fn ready(result: Result<(), QueueError>) -> Self {
        let (tx, handle) = Self::channel();
        let _ = tx.send(result);
        handle
    }
}

impl Future for CompletionHandle {
    type Output = Result<(), QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(QueueError::Shutdown)))
    }
}

/// Persistence queue API - inbound port.
pub trait PersistenceQueue<T>: Send + Sync {
    /// Accepts `item` without blocking.
    fn enqueue(&self, item: T) -> CompletionHandle;

    /// Counters since the last stats line.
    fn stats(&self) -> QueueStatsSnapshot;

    /// Stops the worker. Pending items resolve to [`QueueError::Shutdown`].
    fn shutdown(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropped_sender_resolves_to_shutdown() {
        let (tx, handle) = CompletionHandle::channel();
        drop(tx);
        assert!(matches!(handle.await, Err(QueueError::Shutdown)));
    }

    #[tokio::test]
    async fn test_ready_handle() {
        assert!(CompletionHandle::ready(Ok(())).await.is_ok());
    }
}
