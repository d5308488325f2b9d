//! # Ring Hashing
//!
//! Maps entity ids and member positions to signed 64-bit ring keys.
//!
//! Inputs are serialized the same way for every hash function:
//!
//! - entity: most significant word, least significant word, each `i64` LE
//! - member: host UTF-8 bytes, port as `i32` LE, replica index as `i32` LE
//!
//! The ring key is the first eight bytes of the digest read little-endian.
//! Digests shorter than eight bytes are zero-extended.

use crate::domain::HashFunctionKind;
use sha2::Sha256;
use sha3::{Digest, Sha3_256};
use shared_types::EntityId;
use std::hash::Hasher;
use std::io::Cursor;
use twox_hash::XxHash64;

impl HashFunctionKind {
    /// Ring key of an entity.
    pub fn hash_entity(self, entity_id: &EntityId) -> i64 {
        let (msb, lsb) = entity_id.words();
        let mut input = [0u8; 16];
        input[..8].copy_from_slice(&msb.to_le_bytes());
        input[8..].copy_from_slice(&lsb.to_le_bytes());
        self.ring_key(&input)
    }

    /// Ring key of one virtual node of a member.
    pub fn hash_member(self, host: &str, port: u16, replica: u32) -> i64 {
        let mut input = Vec::with_capacity(host.len() + 8);
        input.extend_from_slice(host.as_bytes());
        input.extend_from_slice(&i32::from(port).to_le_bytes());
        input.extend_from_slice(&(replica as i32).to_le_bytes());
        self.ring_key(&input)
    }

    /// Digest of `input`, reduced to a ring key.
    pub fn ring_key(self, input: &[u8]) -> i64 {
        let mut key = [0u8; 8];
        match self {
            Self::Murmur3_32 => {
                let hash = murmur3::murmur3_32(&mut Cursor::new(input), 0).unwrap_or(0);
                key[..4].copy_from_slice(&hash.to_le_bytes());
            }
            Self::Murmur3_128 => {
                let hash = murmur3::murmur3_x64_128(&mut Cursor::new(input), 0).unwrap_or(0);
                key.copy_from_slice(&hash.to_le_bytes()[..8]);
            }
            Self::Sha256 => key.copy_from_slice(&Sha256::digest(input)[..8]),
            Self::Sha3_256 => key.copy_from_slice(&Sha3_256::digest(input)[..8]),
            Self::XxHash64 => {
                let mut hasher = XxHash64::with_seed(0);
                hasher.write(input);
                key = hasher.finish().to_le_bytes();
            }
        }
        i64::from_le_bytes(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const ALL: [HashFunctionKind; 5] = [
        HashFunctionKind::Murmur3_32,
        HashFunctionKind::Murmur3_128,
        HashFunctionKind::Sha256,
        HashFunctionKind::Sha3_256,
        HashFunctionKind::XxHash64,
    ];

    #[test]
    fn test_hash_is_deterministic() {
        let id = EntityId::device(Uuid::new_v4());
        for kind in ALL {
            assert_eq!(kind.hash_entity(&id), kind.hash_entity(&id));
            assert_eq!(
                kind.hash_member("10.0.0.1", 9090, 3),
                kind.hash_member("10.0.0.1", 9090, 3)
            );
        }
    }

    #[test]
    fn test_replica_index_changes_position() {
        for kind in ALL {
            assert_ne!(
                kind.hash_member("10.0.0.1", 9090, 0),
                kind.hash_member("10.0.0.1", 9090, 1)
            );
        }
    }

    #[test]
    fn test_murmur3_32_is_zero_extended() {
        let key = HashFunctionKind::Murmur3_32.ring_key(b"device");
        assert!(key >= 0);
        assert!(key <= i64::from(u32::MAX));
    }

    #[test]
    fn test_sha256_prefix_little_endian() {
        // SHA-256("abc") starts with ba 78 16 bf 8f 01 cf ea.
        let key = HashFunctionKind::Sha256.ring_key(b"abc");
        assert_eq!(
            key,
            i64::from_le_bytes([0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea])
        );
    }

    #[test]
    fn test_entity_type_does_not_affect_key() {
        let id = Uuid::new_v4();
        let kind = HashFunctionKind::Murmur3_128;
        assert_eq!(
            kind.hash_entity(&EntityId::device(id)),
            kind.hash_entity(&EntityId::tenant(id))
        );
    }
}
