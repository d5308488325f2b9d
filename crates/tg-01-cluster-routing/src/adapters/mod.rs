//! # Adapters
//!
//! - `discovery`: static member list from configuration
//! - `membership_listener`: feeds bus membership events into the ring

pub mod discovery;
pub mod membership_listener;

pub use discovery::StaticDiscoveryService;
pub use membership_listener::MembershipListener;
