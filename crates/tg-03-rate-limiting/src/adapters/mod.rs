//! # Adapters

pub mod layer;

pub use layer::{RateLimitLayer, RateLimitService, TOO_MANY_REQUESTS_ERROR_CODE};
