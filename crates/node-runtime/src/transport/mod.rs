//! # Transport Service
//!
//! Node side of the MQTT transport: credential checks, the live session
//! registry and reply delivery back to sessions.

pub mod registry;
pub mod reply;
pub mod service;

pub use registry::{SessionRegistry, SessionSummary};
pub use reply::SessionReplyRouter;
pub use service::LocalTransportService;
