//! # Latest Value Store
//!
//! Default sink for the persistence queues when no database is attached:
//! keeps the newest value per device and key.

use crate::actors::{AttributeRecord, AttributeScope, TsRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use shared_types::KvValue;
use std::sync::atomic::{AtomicU64, Ordering};
use tg_04_batch_queue::{BulkWriteError, BulkWriter};
use uuid::Uuid;

/// Newest telemetry and attribute values, keyed by device.
#[derive(Debug, Default)]
pub struct LatestValueStore {
    telemetry: DashMap<(Uuid, String), (i64, KvValue)>,
    attributes: DashMap<(Uuid, AttributeScope, String), (i64, KvValue)>,
    batches: AtomicU64,
}

impl LatestValueStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest sample of `key` as `(ts, value)`.
    pub fn latest_telemetry(&self, device_id: Uuid, key: &str) -> Option<(i64, KvValue)> {
        self.telemetry
            .get(&(device_id, key.to_string()))
            .map(|entry| entry.clone())
    }

    /// Current attribute value as `(last_update_ts, value)`.
    pub fn attribute(&self, device_id: Uuid, scope: AttributeScope, key: &str) -> Option<(i64, KvValue)> {
        self.attributes
            .get(&(device_id, scope, key.to_string()))
            .map(|entry| entry.clone())
    }

    /// Batches written so far.
    pub fn batches_written(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }
}

/// Keeps `(ts, value)` unless the stored sample is newer.
fn keep_newest<K: std::hash::Hash + Eq>(
    map: &DashMap<K, (i64, KvValue)>,
    key: K,
    ts: i64,
    value: KvValue,
) {
    map.entry(key)
        .and_modify(|current| {
            if ts >= current.0 {
                *current = (ts, value.clone());
            }
        })
        .or_insert((ts, value));
}

#[async_trait]
impl BulkWriter<TsRecord> for LatestValueStore {
    async fn write(&self, items: Vec<TsRecord>) -> Result<(), BulkWriteError> {
        for record in items {
            keep_newest(
                &self.telemetry,
                (record.entity_id.id, record.kv.key),
                record.ts,
                record.kv.value,
            );
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl BulkWriter<AttributeRecord> for LatestValueStore {
    async fn write(&self, items: Vec<AttributeRecord>) -> Result<(), BulkWriteError> {
        for record in items {
            keep_newest(
                &self.attributes,
                (record.entity_id.id, record.scope, record.kv.key),
                record.last_update_ts,
                record.kv.value,
            );
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
