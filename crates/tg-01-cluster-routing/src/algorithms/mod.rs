//! # Algorithms
//!
//! - `hashing`: ring keys for entities and member virtual nodes
//! - `hash_ring`: the consistent hash ring

pub mod hash_ring;
pub mod hashing;

pub use hash_ring::{AddOutcome, ConsistentHashRing};
