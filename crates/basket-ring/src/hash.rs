//! Token hashing

use sha1::{Digest, Sha1};

/// Position of `key` on the ring: the first 8 bytes of its SHA-1, big-endian
pub fn hash_key(key: &str) -> u64 {
    let digest = Sha1::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Virtual key whose hash becomes a node's `index`-th token
pub(crate) fn token_seed(node: &str, index: usize, collision: u64) -> String {
    format!("{}#{}#{}", node, index, collision)
}
