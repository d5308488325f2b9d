//! # Domain Errors

use shared_types::EntityType;
use thiserror::Error;

/// A request rejected by a per entity budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The tenant budget is exhausted.
    #[error("Too many requests for current tenant!")]
    Tenant,

    /// The customer budget is exhausted.
    #[error("Too many requests for current customer!")]
    Customer,
}

impl RateLimitError {
    /// Entity whose budget ran out.
    pub fn entity_type(self) -> EntityType {
        match self {
            Self::Tenant => EntityType::Tenant,
            Self::Customer => EntityType::Customer,
        }
    }
}

/// Unparsable limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitConfigError {
    /// No tiers at all.
    #[error("Rate limit configuration is empty")]
    Empty,

    /// A tier that is not `capacity:seconds`.
    #[error("Invalid rate limit tier '{0}', expected <capacity>:<seconds>")]
    InvalidTier(String),

    /// A tier with zero capacity or a zero window.
    #[error("Rate limit tier '{0}' must have non-zero capacity and window")]
    ZeroTier(String),
}
