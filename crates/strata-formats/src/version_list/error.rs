//! Error types for version list parsing and building

use thiserror::Error;

/// Errors that can occur when parsing or building version lists
#[derive(Debug, Error)]
pub enum VersionListError {
    /// Header magic does not match the expected list kind
    #[error("Invalid magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        /// Magic of the list kind being parsed
        expected: [u8; 3],
        /// Magic found in the data
        actual: [u8; 3],
    },

    /// Schema version is not known to this build
    #[error("Unsupported schema version {version} for {kind}")]
    UnsupportedVersion {
        /// List kind name
        kind: &'static str,
        /// Version byte found in the header
        version: u8,
    },

    /// Data ended before the structure was complete
    #[error("Truncated data: {0}")]
    Truncated(String),

    /// Data continued after the structure was complete
    #[error("Trailing data: {0} bytes after end of list")]
    TrailingData(usize),

    /// Variable-length integer ran past its maximum width
    #[error("Variable-length integer overflow")]
    VarIntOverflow,

    /// String is longer than the one-byte length prefix allows
    #[error("String too long: {0} bytes (max 255)")]
    StringTooLong(usize),

    /// A required string was empty
    #[error("Empty {0} name")]
    EmptyName(&'static str),

    /// String bytes are not UTF-8
    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    /// Unknown load type byte
    #[error("Invalid load type {0}")]
    InvalidLoadType(u8),

    /// An index points outside the table it refers to
    #[error("Index {index} out of range for {table} table of length {len}")]
    IndexOutOfRange {
        /// Referenced table
        table: &'static str,
        /// Offending index
        index: u32,
        /// Table length
        len: usize,
    },

    /// The same resource appears twice
    #[error("Duplicate resource: {0}")]
    DuplicateResource(String),

    /// The same asset appears twice
    #[error("Duplicate asset: {0}")]
    DuplicateAsset(String),

    /// An asset is claimed by more than one resource
    #[error("Asset {asset} owned by more than one resource")]
    AmbiguousAssetOwner {
        /// Asset name
        asset: String,
    },

    /// A resource is assigned to more than one file system
    #[error("Resource {resource} assigned to more than one file system")]
    AmbiguousFileSystem {
        /// Resource name
        resource: String,
    },

    /// A builder reference could not be resolved
    #[error("Unknown {kind} referenced: {name}")]
    UnknownReference {
        /// Referenced kind
        kind: &'static str,
        /// Referenced name
        name: String,
    },

    /// The requested schema version cannot represent the data
    #[error("Schema version {version} cannot represent {feature}")]
    UnsupportedFeature {
        /// Target schema version
        version: u8,
        /// Feature that needs a newer schema
        feature: &'static str,
    },

    /// Resource pack data region does not match the recorded checksum
    #[error("Resource pack data mismatch: {0}")]
    PackDataMismatch(String),

    /// Binary read/write error
    #[error("Binary parsing error: {0}")]
    BinRead(String),

    /// IO error during parsing or building
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<binrw::Error> for VersionListError {
    fn from(e: binrw::Error) -> Self {
        match e {
            binrw::Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                Self::Truncated(io.to_string())
            }
            binrw::Error::Custom { err, .. } => match err.downcast::<Self>() {
                Ok(inner) => *inner,
                Err(other) => Self::BinRead(format!("{other:?}")),
            },
            other => Self::BinRead(other.to_string()),
        }
    }
}

/// Result type alias for version list operations
pub type Result<T> = std::result::Result<T, VersionListError>;

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VersionListError::InvalidMagic {
            expected: *b"SRU",
            actual: *b"XYZ",
        };
        assert!(err.to_string().contains("Invalid magic"));

        let err = VersionListError::IndexOutOfRange {
            table: "asset",
            index: 9,
            len: 3,
        };
        assert!(err.to_string().contains('9'));
        assert!(err.to_string().contains("asset"));
    }

    #[test]
    fn test_eof_maps_to_truncated() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err = VersionListError::from(binrw::Error::Io(io));
        assert!(matches!(err, VersionListError::Truncated(_)));
    }
}
