//! # Partitioned Queue
//!
//! Several [`BatchedPersistenceQueue`]s behind one entry point. Items of the
//! same entity always land in the same partition, so their writes keep
//! arrival order.

use crate::domain::{QueueConfig, QueueStatsSnapshot};
use crate::ports::{BulkWriter, CompletionHandle, PersistenceQueue};
use crate::service::BatchedPersistenceQueue;
use shared_types::EntityId;
use std::sync::Arc;

/// Items that know which entity they belong to.
pub trait PartitionKey {
    /// Entity deciding the partition.
    fn partition_key(&self) -> EntityId;
}

/// `batch_threads` independent queues sharing one writer.
pub struct PartitionedBatchQueue<T> {
    partitions: Vec<BatchedPersistenceQueue<T>>,
}

impl<T: PartitionKey + Send + 'static> PartitionedBatchQueue<T> {
    /// Starts one queue per partition, named `{log_name}-{n}`.
    pub fn start(log_name: &str, config: &QueueConfig, writer: Arc<dyn BulkWriter<T>>) -> Self {
        let partitions = (0..config.batch_threads.max(1))
            .map(|n| {
                BatchedPersistenceQueue::start(config.params(format!("{log_name}-{n}")), writer.clone())
            })
            .collect();
        Self { partitions }
    }

    /// Number of partitions.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition index of `entity_id`.
    pub fn partition_of(&self, entity_id: &EntityId) -> usize {
        (entity_id.id.as_u128() % self.partitions.len() as u128) as usize
    }
}

impl<T: PartitionKey + Send + 'static> PersistenceQueue<T> for PartitionedBatchQueue<T> {
    fn enqueue(&self, item: T) -> CompletionHandle {
        let index = self.partition_of(&item.partition_key());
        self.partitions[index].enqueue(item)
    }

    fn stats(&self) -> QueueStatsSnapshot {
        self.partitions
            .iter()
            .map(|partition| partition.stats())
            .fold(QueueStatsSnapshot::default(), |acc, s| QueueStatsSnapshot {
                queue_size: acc.queue_size + s.queue_size,
                added: acc.added + s.added,
                saved: acc.saved + s.saved,
                failed: acc.failed + s.failed,
            })
    }

    fn shutdown(&self) {
        for partition in &self.partitions {
            partition.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QueueError;
    use crate::ports::MockBulkWriter;
    use shared_types::EntityType;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        device: EntityId,
        seq: u32,
    }

    impl PartitionKey for Sample {
        fn partition_key(&self) -> EntityId {
            self.device
        }
    }

    fn device(n: u128) -> EntityId {
        EntityId::new(EntityType::Device, Uuid::from_u128(n))
    }

    fn config(batch_threads: usize) -> QueueConfig {
        QueueConfig {
            batch_size: 4,
            max_delay_ms: 20,
            batch_threads,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_of_one_entity_keep_order() {
        let writer = Arc::new(MockBulkWriter::<Sample>::default());
        let queue = PartitionedBatchQueue::start("ts", &config(3), writer.clone());
        assert_eq!(queue.partition_count(), 3);

        let mut handles = Vec::new();
        for seq in 0..10 {
            for n in 0..3 {
                handles.push(queue.enqueue(Sample {
                    device: device(n),
                    seq,
                }));
            }
        }
        for handle in handles {
            assert!(handle.await.is_ok());
        }

        let items = writer.items();
        assert_eq!(items.len(), 30);
        for n in 0..3 {
            let seqs: Vec<u32> = items
                .iter()
                .filter(|s| s.device == device(n))
                .map(|s| s.seq)
                .collect();
            assert_eq!(seqs, (0..10).collect::<Vec<_>>());
        }
        assert_eq!(queue.stats().saved, 30);
    }

    #[test]
    fn test_partition_is_stable() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = runtime.enter();
        let writer = Arc::new(MockBulkWriter::<Sample>::default());
        let queue = PartitionedBatchQueue::start("ts", &config(4), writer);

        assert_eq!(queue.partition_of(&device(5)), 1);
        assert_eq!(queue.partition_of(&device(8)), 0);
        assert_eq!(queue.partition_of(&device(5)), queue.partition_of(&device(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_every_partition() {
        let writer = Arc::new(MockBulkWriter::<Sample>::default());
        let queue = PartitionedBatchQueue::start("ts", &config(2), writer);
        queue.shutdown();

        let outcome = queue.enqueue(Sample { device: device(1), seq: 0 }).await;
        assert!(matches!(outcome, Err(QueueError::Shutdown)));
    }
}
