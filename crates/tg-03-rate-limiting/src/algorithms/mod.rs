//! # Algorithms

pub mod bucket;

pub use bucket::MultiTierBucket;
