//! CRC-32 resource hashes
//!
//! Uses the ISO-HDLC polynomial (the zlib/PNG CRC) so hashes computed by
//! build tooling in other ecosystems match the ones verified here.

use crate::error::CryptoError;
use crc::{CRC_32_ISO_HDLC, Crc, Digest};
use std::fmt;

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 of a resource's bytes, as recorded in every manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ResourceHash(u32);

impl ResourceHash {
    /// Wrap a raw CRC value
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Compute the hash of `data`
    pub fn of(data: &[u8]) -> Self {
        Self(CRC32.checksum(data))
    }

    /// Raw CRC value
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Big-endian bytes of the hash; the XOR key material for encrypted resources
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Eight lowercase hex digits, the suffix used in remote file names
    pub fn to_hex(self) -> String {
        format!("{:08x}", self.0)
    }

    /// Parse eight hex digits
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let mut bytes = [0u8; 4];
        hex::decode_to_slice(text, &mut bytes)
            .map_err(|_| CryptoError::InvalidHex(text.to_string()))?;
        Ok(Self(u32::from_be_bytes(bytes)))
    }
}

impl From<u32> for ResourceHash {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for ResourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Incremental CRC-32 for data that arrives in pieces
pub struct Crc32Hasher {
    digest: Digest<'static, u32>,
}

impl Crc32Hasher {
    /// Start a new hash
    pub fn new() -> Self {
        Self {
            digest: CRC32.digest(),
        }
    }

    /// Feed more bytes
    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    /// Finish and return the hash
    pub fn finalize(self) -> ResourceHash {
        ResourceHash(self.digest.finalize())
    }
}

impl Default for Crc32Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // Standard check value for CRC-32/ISO-HDLC
        assert_eq!(ResourceHash::of(b"123456789").value(), 0xCBF4_3926);
        assert_eq!(ResourceHash::of(b"").value(), 0);
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = ResourceHash::new(0x0012_abcd);
        assert_eq!(hash.to_hex(), "0012abcd");
        assert_eq!(hash.to_string(), "0012abcd");
        assert_eq!(ResourceHash::from_hex("0012abcd").unwrap(), hash);
        assert!(ResourceHash::from_hex("xyz").is_err());
    }

    #[test]
    fn test_key_bytes_are_big_endian() {
        assert_eq!(ResourceHash::new(0x0102_0304).to_bytes(), [1, 2, 3, 4]);
    }

    proptest! {
        #[test]
        fn incremental_matches_one_shot(data in proptest::collection::vec(any::<u8>(), 0..2048), split in 0usize..2048) {
            let split = split.min(data.len());
            let mut hasher = Crc32Hasher::new();
            hasher.update(&data[..split]);
            hasher.update(&data[split..]);
            prop_assert_eq!(hasher.finalize(), ResourceHash::of(&data));
        }
    }
}
