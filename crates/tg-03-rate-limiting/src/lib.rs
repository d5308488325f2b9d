//! # TG-03 Rate Limiting
//!
//! Approximate per tenant and per customer request admission.
//!
//! **Subsystem ID:** 3
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Multi-tier buckets configured as `"capacity:seconds,..."`
//! - One bucket per tenant id and per customer id, created on first use
//! - System administrators exempt
//! - `tower` layer answering `429 Too Many Requests`
//!
//! Buckets are process local. Nodes do not share budgets.
//!
//! ## Module Structure
//!
//! ```text
//! tg-03-rate-limiting/
//! ├── domain/          # Tier parsing, RateLimitsConfig, errors
//! ├── algorithms/      # MultiTierBucket (governor GCRA per tier)
//! ├── ports/           # RateLimitApi
//! ├── adapters/        # RateLimitLayer (tower)
//! └── service.rs       # RateLimitRegistry
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{RateLimitLayer, RateLimitService};
pub use algorithms::MultiTierBucket;
pub use domain::{
    parse_configuration, EntityLimitConfig, RateLimitConfigError, RateLimitError,
    RateLimitsConfig, TierSpec,
};
pub use ports::{MockRateLimiter, RateLimitApi};
pub use service::RateLimitRegistry;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
