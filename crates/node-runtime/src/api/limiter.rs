//! Rate limiter that counts its rejections.

use shared_types::SecurityUser;
use std::sync::Arc;
use tg_03_rate_limiting::{RateLimitApi, RateLimitError};
use tg_telemetry::RATE_LIMIT_REJECTIONS;

/// Wraps a [`RateLimitApi`] and exports rejections by entity type.
pub struct MeteredRateLimiter {
    inner: Arc<dyn RateLimitApi>,
}

impl MeteredRateLimiter {
    /// Meters `inner`.
    pub fn new(inner: Arc<dyn RateLimitApi>) -> Self {
        Self { inner }
    }
}

impl RateLimitApi for MeteredRateLimiter {
    fn check_user(&self, user: &SecurityUser) -> Result<(), RateLimitError> {
        let verdict = self.inner.check_user(user);
        if let Err(e) = verdict {
            let label = match e {
                RateLimitError::Tenant => "tenant",
                RateLimitError::Customer => "customer",
            };
            RATE_LIMIT_REJECTIONS.with_label_values(&[label]).inc();
        }
        verdict
    }
}
