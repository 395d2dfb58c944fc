//! Served form of a resource
//!
//! A resource is stored encrypted as its load type requires, keyed by the
//! CRC-32 of its plain bytes, and optionally zlib-compressed on top for
//! transfer. Manifests record both the plain and the served length/hash.

use crate::compression::{self, CompressionError};
use crate::load_type::LoadType;
use strata_crypto::ResourceHash;

/// Resource bytes as served plus the digests a manifest records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePayload {
    /// Plain length
    pub length: u32,
    /// CRC-32 of the plain bytes
    pub hash: ResourceHash,
    /// Served length
    pub compressed_length: u32,
    /// CRC-32 of the served bytes
    pub compressed_hash: ResourceHash,
    /// Served bytes
    pub bytes: Vec<u8>,
}

impl ResourcePayload {
    /// Encrypt `plain` for `load_type` and optionally compress it
    pub fn encode(
        load_type: LoadType,
        plain: &[u8],
        compress: bool,
    ) -> Result<Self, CompressionError> {
        let hash = ResourceHash::of(plain);
        let mut stored = plain.to_vec();
        load_type.decrypt(&mut stored, hash);

        let bytes = if compress {
            compression::compress(&stored)?
        } else {
            stored
        };

        let (compressed_length, compressed_hash) = if compress {
            (bytes.len() as u32, ResourceHash::of(&bytes))
        } else {
            (plain.len() as u32, hash)
        };

        Ok(Self {
            length: plain.len() as u32,
            hash,
            compressed_length,
            compressed_hash,
            bytes,
        })
    }

    /// Whether the served bytes are compressed
    pub fn is_compressed(&self) -> bool {
        self.length != self.compressed_length || self.hash != self.compressed_hash
    }
}
