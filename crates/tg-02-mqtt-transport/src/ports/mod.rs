//! # Ports
//!
//! The packet handling API the connection driver calls, and the transport
//! service the sessions depend on.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
