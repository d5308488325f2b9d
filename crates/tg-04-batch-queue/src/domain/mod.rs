//! # Domain Module
//!
//! Queue settings, counters and errors.

pub mod config;
pub mod errors;
pub mod stats;

pub use config::*;
pub use errors::*;
pub use stats::*;
