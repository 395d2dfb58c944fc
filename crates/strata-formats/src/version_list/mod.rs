//! Version list (manifest) formats
//!
//! Four list kinds share one header and one set of primitive encodings:
//!
//! | kind | magic | written by | read by |
//! |---|---|---|---|
//! | [`PackageVersionList`] | `SRP` | build pipeline | package-mode initer |
//! | [`UpdatableVersionList`] | `SRU` | update server | checker |
//! | [`LocalVersionList`] | `SRL` | updater | checker |
//! | [`ResourcePackVersionList`] | `SRK` | build pipeline | updater apply path |
//!
//! Schema versions 0 to 2 of the first three kinds stay readable forever:
//! a cache written by an old client must be understood by a new one.
//!
//! - v0: little-endian fixed-width integers, no resource extensions, no file
//!   system table
//! - v1: 7-bit variable-length integers, resource extensions
//! - v2: v1 plus the file system table
//!
//! Every body starts with a random four-byte key used to XOR the strings.

pub mod codec;
pub mod error;
pub mod header;
pub mod local;
pub mod package;
pub mod resource_pack;
pub mod tables;
pub mod updatable;

pub use error::{Result, VersionListError};
pub use header::{ListKind, VersionListHeader};
pub use local::{LocalResource, LocalVersionList};
pub use package::{PackageResource, PackageVersionList, PackageVersionListBuilder};
pub use resource_pack::{PackResource, ResourcePackBuilder, ResourcePackVersionList};
pub use tables::{IndexedResource, VersionAsset, VersionFileSystem, VersionResourceGroup};
pub use updatable::{UpdatableResource, UpdatableVersionList, UpdatableVersionListBuilder};

use codec::STRING_KEY_LENGTH;

/// Common parse/build surface of the list kinds
pub trait VersionListFormat: Sized {
    /// Kind written in the header
    const KIND: ListKind;

    /// Parse a complete list, any supported schema version
    fn parse(data: &[u8]) -> Result<Self>;

    /// Serialize at `version` with a caller-chosen string key
    fn build_with_key(&self, version: u8, key: [u8; STRING_KEY_LENGTH]) -> Result<Vec<u8>>;

    /// Serialize at `version` with a fresh random string key
    fn build_version(&self, version: u8) -> Result<Vec<u8>> {
        self.build_with_key(version, codec::random_key())
    }

    /// Serialize at the newest schema version
    fn build(&self) -> Result<Vec<u8>> {
        self.build_version(Self::KIND.latest_version())
    }
}
