//! Self-XOR transforms keyed by a resource's own hash
//!
//! A resource whose load type requests encryption is stored as
//! `plain XOR key`, where the key is the big-endian bytes of the CRC-32 of
//! the plain content. Verifying such a resource therefore means hashing the
//! XOR-decrypted view and comparing against the recorded hash.

use crate::crc32::{Crc32Hasher, ResourceHash};

/// Number of leading bytes touched by the quick transform
pub const QUICK_ENCRYPT_LENGTH: usize = 220;

/// Chunk size used when hashing an XOR view without allocating
const VIEW_CHUNK: usize = 4096;

/// Four-byte XOR key derived from a resource hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashKey([u8; 4]);

impl HashKey {
    /// Use raw key bytes
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Key bytes
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<ResourceHash> for HashKey {
    fn from(hash: ResourceHash) -> Self {
        Self(hash.to_bytes())
    }
}

/// XOR the first `length` bytes of `data` in place, cycling the key
pub fn self_xor_prefix(data: &mut [u8], key: &HashKey, length: usize) {
    let end = length.min(data.len());
    for (i, byte) in data[..end].iter_mut().enumerate() {
        *byte ^= key.0[i % key.0.len()];
    }
}

/// Quick transform: XOR only the first [`QUICK_ENCRYPT_LENGTH`] bytes
pub fn quick_self_xor(data: &mut [u8], key: &HashKey) {
    self_xor_prefix(data, key, QUICK_ENCRYPT_LENGTH);
}

/// Full transform: XOR every byte
pub fn self_xor(data: &mut [u8], key: &HashKey) {
    let length = data.len();
    self_xor_prefix(data, key, length);
}

/// CRC-32 of `data` as if its first `length` bytes had been XORed with `key`
///
/// `data` is not modified.
pub fn crc32_with_xor(data: &[u8], key: &HashKey, length: usize) -> ResourceHash {
    let end = length.min(data.len());
    let mut hasher = Crc32Hasher::new();
    let mut buffer = [0u8; VIEW_CHUNK];

    let mut offset = 0;
    while offset < end {
        let take = (end - offset).min(VIEW_CHUNK);
        for i in 0..take {
            buffer[i] = data[offset + i] ^ key.0[(offset + i) % key.0.len()];
        }
        hasher.update(&buffer[..take]);
        offset += take;
    }

    hasher.update(&data[end..]);
    hasher.finalize()
}
