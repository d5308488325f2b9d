//! # Domain Module

pub mod config;
pub mod errors;

pub use config::*;
pub use errors::*;
