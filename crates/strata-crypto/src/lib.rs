//! Checksums and content transforms for strata resource distribution
//!
//! Every resource shipped through strata is identified on the wire by a
//! CRC-32 of its plain bytes. The same value doubles as the key for the two
//! lightweight obfuscation transforms the manifests can request:
//!
//! - **Quick XOR**: only the first [`QUICK_ENCRYPT_LENGTH`] bytes are XORed
//! - **Full XOR**: every byte is XORed
//!
//! Both transforms are involutions, so the same call encrypts and decrypts.
//!
//! # Examples
//!
//! ```
//! use strata_crypto::{HashKey, ResourceHash, xor};
//!
//! let plain = b"texture payload".to_vec();
//! let hash = ResourceHash::of(&plain);
//!
//! let mut stored = plain.clone();
//! xor::quick_self_xor(&mut stored, &HashKey::from(hash));
//!
//! // Verification hashes the decrypted view, never the stored bytes.
//! assert_eq!(xor::crc32_with_xor(&stored, &HashKey::from(hash), xor::QUICK_ENCRYPT_LENGTH), hash);
//! ```

#![warn(missing_docs)]

pub mod crc32;
pub mod error;
pub mod xor;

pub use crc32::{Crc32Hasher, ResourceHash};
pub use error::CryptoError;
pub use xor::{HashKey, QUICK_ENCRYPT_LENGTH};
