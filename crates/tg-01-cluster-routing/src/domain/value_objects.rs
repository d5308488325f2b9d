//! # Value Objects
//!
//! Ring configuration and the set of supported hash functions.

use crate::domain::RoutingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default number of ring positions per member.
pub const DEFAULT_VIRTUAL_NODES: usize = 16;

/// Hash function used to place members and entities on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HashFunctionKind {
    /// 32-bit murmur3 (x86), zero-extended to 64 bits.
    Murmur3_32,
    /// 128-bit murmur3 (x64), first 64 bits.
    #[default]
    Murmur3_128,
    /// SHA-256, first 64 bits.
    Sha256,
    /// SHA3-256, first 64 bits.
    Sha3_256,
    /// xxHash64 with seed 0.
    XxHash64,
}

impl HashFunctionKind {
    /// Look up a hash function by its configuration name.
    pub fn from_name(name: &str) -> Result<Self, RoutingError> {
        match name.trim() {
            "murmur3_32" => Ok(Self::Murmur3_32),
            "murmur3_128" => Ok(Self::Murmur3_128),
            "sha256" => Ok(Self::Sha256),
            "sha3_256" => Ok(Self::Sha3_256),
            "xxhash64" => Ok(Self::XxHash64),
            other => Err(RoutingError::UnknownHashFunction(other.to_string())),
        }
    }

    /// Configuration name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Murmur3_32 => "murmur3_32",
            Self::Murmur3_128 => "murmur3_128",
            Self::Sha256 => "sha256",
            Self::Sha3_256 => "sha3_256",
            Self::XxHash64 => "xxhash64",
        }
    }
}

impl fmt::Display for HashFunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashFunctionKind {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Ring configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingConfig {
    /// Hash function.
    pub hash_function: HashFunctionKind,
    /// Ring positions per member. At least one.
    pub virtual_nodes: usize,
}

impl RoutingConfig {
    /// Builds a configuration from its textual form.
    pub fn from_names(hash_function_name: &str, virtual_nodes: usize) -> Result<Self, RoutingError> {
        let config = Self {
            hash_function: HashFunctionKind::from_name(hash_function_name)?,
            virtual_nodes,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects a zero virtual node count.
    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.virtual_nodes == 0 {
            return Err(RoutingError::InvalidVirtualNodes(self.virtual_nodes));
        }
        Ok(())
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            hash_function: HashFunctionKind::default(),
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_roundtrips_every_kind() {
        for kind in [
            HashFunctionKind::Murmur3_32,
            HashFunctionKind::Murmur3_128,
            HashFunctionKind::Sha256,
            HashFunctionKind::Sha3_256,
            HashFunctionKind::XxHash64,
        ] {
            assert_eq!(HashFunctionKind::from_name(kind.name()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_hash_function() {
        let result = HashFunctionKind::from_name("md5");
        assert!(matches!(result, Err(RoutingError::UnknownHashFunction(name)) if name == "md5"));
    }

    #[test]
    fn test_zero_virtual_nodes_rejected() {
        let result = RoutingConfig::from_names("murmur3_128", 0);
        assert!(matches!(result, Err(RoutingError::InvalidVirtualNodes(0))));
    }

    #[test]
    fn test_default_config() {
        let config = RoutingConfig::default();
        assert_eq!(config.hash_function, HashFunctionKind::Murmur3_128);
        assert_eq!(config.virtual_nodes, 16);
    }
}
