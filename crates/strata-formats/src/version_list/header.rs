//! Four-byte header shared by every version list kind
//!
//! ```text
//! [0..3]  magic   SRP | SRU | SRL | SRK
//! [3]     version schema version byte
//! ```

use crate::version_list::codec::IntEncoding;
use crate::version_list::error::{Result, VersionListError};
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

/// Header length in bytes
pub const HEADER_LENGTH: usize = 4;

/// Which manifest a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// Bundled manifest of a non-updatable build
    Package,
    /// Remote manifest published by the update server
    Updatable,
    /// Verified read-only or read-write cache manifest
    Local,
    /// Table of contents of a resource pack file
    ResourcePack,
}

impl ListKind {
    /// Magic bytes identifying this kind
    pub const fn magic(self) -> [u8; 3] {
        match self {
            Self::Package => *b"SRP",
            Self::Updatable => *b"SRU",
            Self::Local => *b"SRL",
            Self::ResourcePack => *b"SRK",
        }
    }

    /// Newest schema version this build writes
    pub const fn latest_version(self) -> u8 {
        match self {
            Self::Package | Self::Updatable | Self::Local => 2,
            Self::ResourcePack => 0,
        }
    }

    /// Human readable kind name used in errors
    pub const fn name(self) -> &'static str {
        match self {
            Self::Package => "package version list",
            Self::Updatable => "updatable version list",
            Self::Local => "local version list",
            Self::ResourcePack => "resource pack version list",
        }
    }

    /// Integer encoding used by the body of `version`
    pub const fn encoding(self, version: u8) -> IntEncoding {
        match self {
            // Resource packs were introduced after the varint switch
            Self::ResourcePack => IntEncoding::Variable,
            _ => IntEncoding::for_version(version),
        }
    }
}

/// Version list header
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct VersionListHeader {
    /// Kind magic
    pub magic: [u8; 3],
    /// Schema version
    pub version: u8,
}

impl VersionListHeader {
    /// Header for `kind` at `version`
    pub const fn new(kind: ListKind, version: u8) -> Self {
        Self {
            magic: kind.magic(),
            version,
        }
    }

    /// Parse and validate the header of `data` as `kind`
    ///
    /// Returns the header and the body that follows it.
    pub fn parse(data: &[u8], kind: ListKind) -> Result<(Self, &[u8])> {
        if data.len() < HEADER_LENGTH {
            return Err(VersionListError::Truncated(format!(
                "{} header needs {HEADER_LENGTH} bytes, got {}",
                kind.name(),
                data.len()
            )));
        }

        let header = Self::read(&mut Cursor::new(&data[..HEADER_LENGTH]))?;
        if header.magic != kind.magic() {
            return Err(VersionListError::InvalidMagic {
                expected: kind.magic(),
                actual: header.magic,
            });
        }
        if header.version > kind.latest_version() {
            return Err(VersionListError::UnsupportedVersion {
                kind: kind.name(),
                version: header.version,
            });
        }

        Ok((header, &data[HEADER_LENGTH..]))
    }

    /// Serialize the header to its four bytes
    pub fn to_bytes(self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LENGTH));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// Reject a build request for a version newer than `kind` supports
pub(crate) fn check_build_version(kind: ListKind, version: u8) -> Result<()> {
    if version > kind.latest_version() {
        return Err(VersionListError::UnsupportedVersion {
            kind: kind.name(),
            version,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = VersionListHeader::new(ListKind::Updatable, 2);
        let mut bytes = header.to_bytes().unwrap();
        assert_eq!(bytes, b"SRU\x02");

        bytes.extend_from_slice(&[9, 9]);
        let (parsed, body) = VersionListHeader::parse(&bytes, ListKind::Updatable).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(body, &[9, 9]);
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let bytes = VersionListHeader::new(ListKind::Local, 1).to_bytes().unwrap();
        let err = VersionListHeader::parse(&bytes, ListKind::Package).unwrap_err();
        assert!(matches!(err, VersionListError::InvalidMagic { .. }));
    }

    #[test]
    fn test_future_version_rejected() {
        let err = VersionListHeader::parse(b"SRL\x07", ListKind::Local).unwrap_err();
        assert!(matches!(
            err,
            VersionListError::UnsupportedVersion { version: 7, .. }
        ));
        assert!(VersionListHeader::parse(b"SRK\x01", ListKind::ResourcePack).is_err());
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(
            VersionListHeader::parse(b"SR", ListKind::Local),
            Err(VersionListError::Truncated(_))
        ));
    }
}
