//! # Domain Errors

use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a bulk writer for a whole batch.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BulkWriteError {
    /// What went wrong.
    pub message: String,
}

impl BulkWriteError {
    /// Wraps a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outcome of an enqueued item that was not saved.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The batch containing the item failed. Shared by every item of it.
    #[error("Batch write failed: {0}")]
    WriteFailed(#[source] Arc<BulkWriteError>),

    /// The queue stopped before the item was written.
    #[error("Queue is shut down")]
    Shutdown,
}

/// Invalid queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueConfigError {
    /// `batch_size` is zero.
    #[error("batch_size must be at least 1")]
    ZeroBatchSize,

    /// `max_delay_ms` is zero.
    #[error("max_delay_ms must be at least 1")]
    ZeroMaxDelay,

    /// `batch_threads` is zero.
    #[error("batch_threads must be at least 1")]
    ZeroBatchThreads,
}
