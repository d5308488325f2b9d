//! # Error Types
//!
//! Errors raised while parsing shared identifiers from configuration.

use thiserror::Error;

/// Failure to parse a shared enum from its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeParseError {
    /// Unknown server role name.
    #[error("Unknown server type: {0}")]
    UnknownServerType(String),

    /// Unknown entity type name.
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),
}
