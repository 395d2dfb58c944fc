//! Error types for checksum and transform operations

use thiserror::Error;

/// Errors that can occur during checksum or transform operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material was empty
    #[error("Empty XOR key")]
    EmptyKey,

    /// Hex string could not be decoded into a hash
    #[error("Invalid hash hex '{0}'")]
    InvalidHex(String),
}
