//! # TG-04 Batch Queue
//!
//! Batched persistence for high rate writes such as telemetry and attribute
//! updates.
//!
//! **Subsystem ID:** 4
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Callers enqueue without blocking and get a [`CompletionHandle`]
//! - One worker per queue flushes up to `batch_size` items per write
//! - A whole batch succeeds or fails together, with no retry
//! - Periodic stats line with interval counters
//!
//! ## Module Structure
//!
//! ```text
//! tg-04-batch-queue/
//! ├── domain/          # QueueConfig, QueueStats, errors
//! ├── ports/           # PersistenceQueue, CompletionHandle, BulkWriter
//! ├── service.rs       # BatchedPersistenceQueue
//! └── partitioned.rs   # PartitionedBatchQueue
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod partitioned;
pub mod ports;
pub mod service;

// Re-exports
pub use domain::{
    BulkWriteError, QueueConfig, QueueConfigError, QueueError, QueueParams, QueueStats,
    QueueStatsSnapshot,
};
pub use partitioned::{PartitionKey, PartitionedBatchQueue};
pub use ports::{BulkWriter, CompletionHandle, MockBulkWriter, PersistenceQueue};
pub use service::BatchedPersistenceQueue;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
