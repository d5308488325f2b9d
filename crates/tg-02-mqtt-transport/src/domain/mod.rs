//! # Domain Module
//!
//! Packets, topics, subscription matching and session state.

pub mod errors;
pub mod packets;
pub mod session;
pub mod topic_matcher;
pub mod topics;

pub use errors::*;
pub use packets::*;
pub use session::*;
pub use topic_matcher::*;
