//! # Inbound Port
//!
//! What request filters call before letting a request through.

use crate::domain::RateLimitError;
use shared_types::SecurityUser;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Rate limit API - inbound port.
pub trait RateLimitApi: Send + Sync {
    /// Admits or rejects one request made by `user`.
    fn check_user(&self, user: &SecurityUser) -> Result<(), RateLimitError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mock limiter answering with a fixed outcome.
#[derive(Default)]
pub struct MockRateLimiter {
    /// Rejection to return, `None` admits.
    pub reject: Option<RateLimitError>,
    /// Number of checks made.
    pub calls: AtomicUsize,
}

impl RateLimitApi for MockRateLimiter {
    fn check_user(&self, _user: &SecurityUser) -> Result<(), RateLimitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reject {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
