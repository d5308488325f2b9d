//! # Outbound Port
//!
//! The store a queue flushes into.

use crate::domain::BulkWriteError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Writes a batch in one operation. The batch succeeds or fails as a whole.
#[async_trait]
pub trait BulkWriter<T>: Send + Sync {
    /// Persists `items` in order.
    async fn write(&self, items: Vec<T>) -> Result<(), BulkWriteError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mock writer recording every batch it receives.
pub struct MockBulkWriter<T> {
    /// Batches in arrival order, failed ones included.
    pub batches: Mutex<Vec<Vec<T>>>,
    /// Zero based batch numbers to fail.
    pub fail_batches: Mutex<HashSet<usize>>,
}

impl<T> Default for MockBulkWriter<T> {
    fn default() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail_batches: Mutex::new(HashSet::new()),
        }
    }
}

impl<T: Clone> MockBulkWriter<T> {
    /// Fails the batch with number `batch`.
    pub fn failing_batch(self, batch: usize) -> Self {
        self.fail_batches.lock().insert(batch);
        self
    }

    /// Sizes of the batches seen so far.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(Vec::len).collect()
    }

    /// Every item seen so far, flattened.
    pub fn items(&self) -> Vec<T> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl<T: Send + 'static> BulkWriter<T> for MockBulkWriter<T> {
    async fn write(&self, items: Vec<T>) -> Result<(), BulkWriteError> {
        let mut batches = self.batches.lock();
        let number = batches.len();
        batches.push(items);
        if self.fail_batches.lock().contains(&number) {
            return Err(BulkWriteError::new(format!("batch {number} rejected")));
        }
        Ok(())
    }
}
