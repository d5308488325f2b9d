//! # Queue Configuration

use crate::domain::errors::QueueConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every batched queue of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Most items per write.
    pub batch_size: usize,
    /// Longest wait for the first item of a batch, and the minimum spacing
    /// between partial batches.
    pub max_delay_ms: u64,
    /// Interval of the stats log line.
    pub stats_print_interval_ms: u64,
    /// Parallel queues in a partitioned queue.
    pub batch_threads: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            max_delay_ms: 100,
            stats_print_interval_ms: 10_000,
            batch_threads: 4,
        }
    }
}

impl QueueConfig {
    /// Rejects settings the worker cannot run with.
    pub fn validate(&self) -> Result<(), QueueConfigError> {
        if self.batch_size == 0 {
            return Err(QueueConfigError::ZeroBatchSize);
        }
        if self.max_delay_ms == 0 {
            return Err(QueueConfigError::ZeroMaxDelay);
        }
        if self.batch_threads == 0 {
            return Err(QueueConfigError::ZeroBatchThreads);
        }
        Ok(())
    }

    /// Parameters for one queue named `log_name`.
    pub fn params(&self, log_name: impl Into<String>) -> QueueParams {
        QueueParams {
            log_name: log_name.into(),
            batch_size: self.batch_size.max(1),
            max_delay: Duration::from_millis(self.max_delay_ms.max(1)),
            stats_print_interval: Duration::from_millis(self.stats_print_interval_ms.max(1)),
        }
    }
}

/// Runtime parameters of one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueParams {
    /// Name used in log lines.
    pub log_name: String,
    /// Most items per write.
    pub batch_size: usize,
    /// Batch window.
    pub max_delay: Duration,
    /// Stats log interval.
    pub stats_print_interval: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert!(config.validate().is_ok());
        let params = config.params("ts");
        assert_eq!(params.batch_size, 10_000);
        assert_eq!(params.max_delay, Duration::from_millis(100));
        assert_eq!(params.stats_print_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let config = QueueConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(QueueConfigError::ZeroBatchSize));

        let config = QueueConfig {
            max_delay_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(QueueConfigError::ZeroMaxDelay));

        let config = QueueConfig {
            batch_threads: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(QueueConfigError::ZeroBatchThreads));
    }
}
