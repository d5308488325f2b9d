//! Rows handed to the persistence queues.

use shared_types::{EntityId, KeyValue};
use tg_04_batch_queue::PartitionKey;
use uuid::Uuid;

/// One telemetry sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TsRecord {
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Device the sample belongs to.
    pub entity_id: EntityId,
    /// Sample time, epoch milliseconds.
    pub ts: i64,
    /// Key and value.
    pub kv: KeyValue,
}

/// Attribute scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeScope {
    /// Reported by the device.
    Client,
    /// Set by the platform and pushed to the device.
    Shared,
}

/// One attribute write.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRecord {
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Device the attribute belongs to.
    pub entity_id: EntityId,
    /// Scope.
    pub scope: AttributeScope,
    /// Key and value.
    pub kv: KeyValue,
    /// Write time, epoch milliseconds.
    pub last_update_ts: i64,
}

impl PartitionKey for TsRecord {
    fn partition_key(&self) -> EntityId {
        self.entity_id
    }
}

impl PartitionKey for AttributeRecord {
    fn partition_key(&self) -> EntityId {
        self.entity_id
    }
}
