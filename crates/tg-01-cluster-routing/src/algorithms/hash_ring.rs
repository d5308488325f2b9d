//! # Consistent Hash Ring
//!
//! Ordered map from ring key to member, with `virtual_nodes` positions per
//! member. Lookup is a successor search that wraps to the smallest key.
//!
//! ## Collisions
//!
//! Two distinct members may hash a virtual node to the same key. The later
//! `add` wins that position and the overwrite is reported to the caller.
//! `remove` only clears positions the member still owns, so removing the
//! loser of a collision never evicts the winner.

use crate::domain::{HashFunctionKind, RoutingConfig};
use shared_types::{EntityId, ServerInstance};
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;

/// Result of adding a member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    /// Positions written.
    pub inserted: usize,
    /// Positions taken over from a different member.
    pub displaced: Vec<ServerInstance>,
}

/// A consistent hash ring for one server role.
#[derive(Debug, Clone)]
pub struct ConsistentHashRing {
    hash_function: HashFunctionKind,
    virtual_nodes: usize,
    entries: BTreeMap<i64, ServerInstance>,
}

impl ConsistentHashRing {
    /// Creates an empty ring.
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            hash_function: config.hash_function,
            virtual_nodes: config.virtual_nodes.max(1),
            entries: BTreeMap::new(),
        }
    }

    fn positions<'a>(&'a self, instance: &'a ServerInstance) -> impl Iterator<Item = i64> + 'a {
        (0..self.virtual_nodes as u32)
            .map(move |i| self.hash_function.hash_member(&instance.host, instance.port, i))
    }

    /// Places every virtual node of `instance`. Re-adding is idempotent.
    pub fn add(&mut self, instance: &ServerInstance) -> AddOutcome {
        let keys: Vec<i64> = self.positions(instance).collect();
        let mut outcome = AddOutcome::default();
        for key in keys {
            if let Some(previous) = self.entries.insert(key, instance.clone()) {
                if previous != *instance {
                    outcome.displaced.push(previous);
                }
            }
            outcome.inserted += 1;
        }
        outcome
    }

    /// Clears the virtual nodes still owned by `instance`. Returns how many.
    pub fn remove(&mut self, instance: &ServerInstance) -> usize {
        let keys: Vec<i64> = self.positions(instance).collect();
        let mut removed = 0;
        for key in keys {
            if self.entries.get(&key) == Some(instance) {
                self.entries.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    /// Owner of the first position at or after `hash`, wrapping around.
    pub fn successor(&self, hash: i64) -> Option<&ServerInstance> {
        self.entries
            .range((Bound::Included(hash), Bound::Unbounded))
            .next()
            .or_else(|| self.entries.iter().next())
            .map(|(_, instance)| instance)
    }

    /// Owner of an entity.
    pub fn locate(&self, entity_id: &EntityId) -> Option<&ServerInstance> {
        self.successor(self.hash_function.hash_entity(entity_id))
    }

    /// Number of positions on the ring.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True before any member is known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct members owning at least one position.
    pub fn members(&self) -> Vec<ServerInstance> {
        let distinct: HashSet<&ServerInstance> = self.entries.values().collect();
        let mut members: Vec<ServerInstance> = distinct.into_iter().cloned().collect();
        members.sort_by(|a, b| (&a.host, a.port).cmp(&(&b.host, b.port)));
        members
    }

    /// All positions in ring order.
    pub fn snapshot(&self) -> Vec<(i64, ServerInstance)> {
        self.entries
            .iter()
            .map(|(key, instance)| (*key, instance.clone()))
            .collect()
    }
}
