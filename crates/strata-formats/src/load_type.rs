//! How a resource is turned into something usable at load time

use crate::version_list::VersionListError;
use strata_crypto::{HashKey, ResourceHash, xor};

/// Load type byte recorded per resource in every manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum LoadType {
    /// Container opened directly from its file
    #[default]
    LoadFromFile = 0,
    /// Container parsed from bytes read into memory
    LoadFromMemory = 1,
    /// As [`Self::LoadFromMemory`], quick XOR applied
    LoadFromMemoryAndQuickDecrypt = 2,
    /// As [`Self::LoadFromMemory`], full XOR applied
    LoadFromMemoryAndDecrypt = 3,
    /// Raw binary handed to the caller, no container
    LoadFromBinary = 4,
    /// As [`Self::LoadFromBinary`], quick XOR applied
    LoadFromBinaryAndQuickDecrypt = 5,
    /// As [`Self::LoadFromBinary`], full XOR applied
    LoadFromBinaryAndDecrypt = 6,
}

/// Which XOR transform a load type applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    /// Stored as plain bytes
    None,
    /// Leading bytes XORed
    Quick,
    /// Every byte XORed
    Full,
}

impl LoadType {
    /// Whether the resource is consumed as raw bytes
    pub const fn is_load_from_binary(self) -> bool {
        matches!(
            self,
            Self::LoadFromBinary | Self::LoadFromBinaryAndQuickDecrypt | Self::LoadFromBinaryAndDecrypt
        )
    }

    /// Whether the container is parsed from memory rather than opened from its file
    pub const fn is_load_from_memory(self) -> bool {
        matches!(
            self,
            Self::LoadFromMemory | Self::LoadFromMemoryAndQuickDecrypt | Self::LoadFromMemoryAndDecrypt
        )
    }

    /// Transform applied to the stored bytes
    pub const fn encryption(self) -> Encryption {
        match self {
            Self::LoadFromMemoryAndQuickDecrypt | Self::LoadFromBinaryAndQuickDecrypt => {
                Encryption::Quick
            }
            Self::LoadFromMemoryAndDecrypt | Self::LoadFromBinaryAndDecrypt => Encryption::Full,
            _ => Encryption::None,
        }
    }

    /// CRC-32 of the decrypted view of `stored`
    ///
    /// `expected` is the hash recorded in the manifest. It is also the key
    /// source, so the caller passes what it expects and compares the result.
    pub fn verify_hash(self, stored: &[u8], expected: ResourceHash) -> ResourceHash {
        let key = HashKey::from(expected);
        match self.encryption() {
            Encryption::None => ResourceHash::of(stored),
            Encryption::Quick => xor::crc32_with_xor(stored, &key, xor::QUICK_ENCRYPT_LENGTH),
            Encryption::Full => xor::crc32_with_xor(stored, &key, stored.len()),
        }
    }

    /// Decrypt `data` in place using the resource's own hash as key
    pub fn decrypt(self, data: &mut [u8], hash: ResourceHash) {
        let key = HashKey::from(hash);
        match self.encryption() {
            Encryption::None => {}
            Encryption::Quick => xor::quick_self_xor(data, &key),
            Encryption::Full => xor::self_xor(data, &key),
        }
    }
}

impl TryFrom<u8> for LoadType {
    type Error = VersionListError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::LoadFromFile,
            1 => Self::LoadFromMemory,
            2 => Self::LoadFromMemoryAndQuickDecrypt,
            3 => Self::LoadFromMemoryAndDecrypt,
            4 => Self::LoadFromBinary,
            5 => Self::LoadFromBinaryAndQuickDecrypt,
            6 => Self::LoadFromBinaryAndDecrypt,
            other => return Err(VersionListError::InvalidLoadType(other)),
        })
    }
}

impl From<LoadType> for u8 {
    fn from(value: LoadType) -> Self {
        value as Self
    }
}
