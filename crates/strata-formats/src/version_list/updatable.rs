//! Remote manifest published by the update server
//!
//! ```text
//! header          SRU + version
//! key             [u8; 4]
//! applicable      string
//! internal        int
//! assets          count * { name, deps: count * int }
//! resources       count * { name, variant, [ext v1+], load_type u8,
//!                           length int, hash u32, zip_length int,
//!                           zip_hash u32, assets: count * int }
//! file_systems    [v2] count * { name, resources: count * int }
//! groups          count * { name, resources: count * int }
//! ```

use crate::load_type::LoadType;
use crate::name::ResourceName;
use crate::version_list::VersionListFormat;
use crate::version_list::codec::{ListReader, ListWriter, STRING_KEY_LENGTH};
use crate::version_list::error::Result;
use crate::version_list::header::{ListKind, VersionListHeader, check_build_version};
use crate::version_list::tables::{
    self, IndexedResource, TableBuilder, VersionAsset, VersionFileSystem, VersionResourceGroup,
};
use strata_crypto::ResourceHash;

/// Resource entry of the remote manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatableResource {
    /// Resource identity
    pub name: ResourceName,
    /// How the resource is loaded
    pub load_type: LoadType,
    /// Plain length
    pub length: u32,
    /// CRC-32 of the plain (decrypted) bytes
    pub hash: ResourceHash,
    /// Length as served, equal to `length` when not compressed
    pub compressed_length: u32,
    /// CRC-32 of the served bytes
    pub compressed_hash: ResourceHash,
    /// Assets stored in this resource
    pub asset_indexes: Vec<u32>,
}

impl UpdatableResource {
    /// Resource entry without assets
    pub fn new(
        name: ResourceName,
        load_type: LoadType,
        length: u32,
        hash: ResourceHash,
        compressed_length: u32,
        compressed_hash: ResourceHash,
    ) -> Self {
        Self {
            name,
            load_type,
            length,
            hash,
            compressed_length,
            compressed_hash,
            asset_indexes: Vec::new(),
        }
    }

    /// Whether the served bytes are zlib-compressed
    pub fn is_compressed(&self) -> bool {
        self.length != self.compressed_length || self.hash != self.compressed_hash
    }
}

impl IndexedResource for UpdatableResource {
    fn resource_name(&self) -> &ResourceName {
        &self.name
    }

    fn asset_indexes(&self) -> &[u32] {
        &self.asset_indexes
    }

    fn set_asset_indexes(&mut self, indexes: Vec<u32>) {
        self.asset_indexes = indexes;
    }
}

/// Remote manifest
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdatableVersionList {
    /// Game version the manifest applies to
    pub applicable_version: String,
    /// Monotone manifest revision
    pub internal_version: u32,
    /// Asset table
    pub assets: Vec<VersionAsset>,
    /// Resource table
    pub resources: Vec<UpdatableResource>,
    /// File system container table
    pub file_systems: Vec<VersionFileSystem>,
    /// Named resource groups
    pub resource_groups: Vec<VersionResourceGroup>,
}

impl UpdatableVersionList {
    /// Read only the internal version, without parsing the tables
    pub fn peek_internal_version(data: &[u8]) -> Result<u32> {
        let (header, body) = VersionListHeader::parse(data, ListKind::Updatable)?;
        let mut reader = ListReader::new(body, ListKind::Updatable.encoding(header.version))?;
        let _applicable_version = reader.read_string("applicable version")?;
        reader.read_u32()
    }

    /// Builder resolving assets, containers and groups by name
    pub fn builder(
        applicable_version: impl Into<String>,
        internal_version: u32,
    ) -> UpdatableVersionListBuilder {
        UpdatableVersionListBuilder {
            applicable_version: applicable_version.into(),
            internal_version,
            tables: TableBuilder::new(),
        }
    }

    /// Look up a resource entry by identity
    pub fn resource(&self, name: &ResourceName) -> Option<&UpdatableResource> {
        self.resources.iter().find(|r| &r.name == name)
    }

    fn validate(&self) -> Result<()> {
        tables::validate_assets(&self.assets)?;
        tables::validate_resources(&self.resources, &self.assets)?;
        tables::validate_file_systems(&self.file_systems, &self.resources)?;
        tables::validate_resource_groups(&self.resource_groups, self.resources.len())
    }
}

impl VersionListFormat for UpdatableVersionList {
    const KIND: ListKind = ListKind::Updatable;

    fn parse(data: &[u8]) -> Result<Self> {
        let (header, body) = VersionListHeader::parse(data, Self::KIND)?;
        let version = header.version;
        let mut reader = ListReader::new(body, Self::KIND.encoding(version))?;

        let applicable_version = reader.read_string("applicable version")?;
        let internal_version = reader.read_u32()?;
        let assets = tables::read_assets(&mut reader)?;

        let (count, capacity) = reader.read_count()?;
        let mut resources = Vec::with_capacity(capacity);
        for _ in 0..count {
            let name = tables::read_resource_name(&mut reader, version >= 1)?;
            let load_type = LoadType::try_from(reader.read_u8()?)?;
            let length = reader.read_u32()?;
            let hash = reader.read_hash()?;
            let compressed_length = reader.read_u32()?;
            let compressed_hash = reader.read_hash()?;
            let asset_indexes = reader.read_indexes()?;
            resources.push(UpdatableResource {
                name,
                load_type,
                length,
                hash,
                compressed_length,
                compressed_hash,
                asset_indexes,
            });
        }

        let file_systems = if version >= 2 {
            tables::read_file_systems(&mut reader)?
        } else {
            Vec::new()
        };
        let resource_groups = tables::read_resource_groups(&mut reader)?;
        reader.finish()?;

        let list = Self {
            applicable_version,
            internal_version,
            assets,
            resources,
            file_systems,
            resource_groups,
        };
        list.validate()?;
        Ok(list)
    }

    fn build_with_key(&self, version: u8, key: [u8; STRING_KEY_LENGTH]) -> Result<Vec<u8>> {
        check_build_version(Self::KIND, version)?;
        self.validate()?;
        if version < 2 {
            tables::require_no_file_systems(&self.file_systems, version)?;
        }

        let header = VersionListHeader::new(Self::KIND, version).to_bytes()?;
        let mut writer = ListWriter::new(header, key, Self::KIND.encoding(version))?;

        writer.write_string(&self.applicable_version, "applicable version")?;
        writer.write_u32(self.internal_version)?;
        tables::write_assets(&mut writer, &self.assets)?;

        writer.write_count(self.resources.len())?;
        for resource in &self.resources {
            tables::write_resource_name(&mut writer, &resource.name, version >= 1, version)?;
            writer.write_u8(resource.load_type.into())?;
            writer.write_u32(resource.length)?;
            writer.write_hash(resource.hash)?;
            writer.write_u32(resource.compressed_length)?;
            writer.write_hash(resource.compressed_hash)?;
            writer.write_indexes(&resource.asset_indexes)?;
        }

        if version >= 2 {
            tables::write_file_systems(&mut writer, &self.file_systems)?;
        }
        tables::write_resource_groups(&mut writer, &self.resource_groups)?;

        Ok(writer.into_inner())
    }
}

/// Builder for [`UpdatableVersionList`]
///
/// Asset indexes of added resources are replaced by the ones resolved from
/// [`Self::asset`] calls.
pub struct UpdatableVersionListBuilder {
    applicable_version: String,
    internal_version: u32,
    tables: TableBuilder<UpdatableResource>,
}

impl UpdatableVersionListBuilder {
    /// Add a resource entry
    #[must_use]
    pub fn resource(mut self, resource: UpdatableResource) -> Self {
        self.tables.add_resource(resource);
        self
    }

    /// Add an asset stored in `owner`
    #[must_use]
    pub fn asset(mut self, owner: &ResourceName, name: &str, dependencies: &[&str]) -> Self {
        self.tables.add_asset(owner, name, dependencies);
        self
    }

    /// Pack `resource` into the container `file_system`
    #[must_use]
    pub fn file_system(mut self, file_system: &str, resource: &ResourceName) -> Self {
        self.tables.add_to_file_system(file_system, resource);
        self
    }

    /// Add `resource` to the named group
    #[must_use]
    pub fn group(mut self, group: &str, resource: &ResourceName) -> Self {
        self.tables.add_to_group(group, resource);
        self
    }

    /// Resolve names and produce the list
    pub fn build(self) -> Result<UpdatableVersionList> {
        let tables = self.tables.build()?;
        Ok(UpdatableVersionList {
            applicable_version: self.applicable_version,
            internal_version: self.internal_version,
            assets: tables.assets,
            resources: tables.resources,
            file_systems: tables.file_systems,
            resource_groups: tables.resource_groups,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::version_list::VersionListError;
    use pretty_assertions::assert_eq;

    fn sample() -> UpdatableVersionList {
        let ui = ResourceName::new("ui", None::<&str>, Some("dat"));
        let hero = ResourceName::new("hero", Some("hd"), Some("dat"));
        UpdatableVersionList::builder("1.0.0", 7)
            .resource(UpdatableResource::new(
                ui.clone(),
                LoadType::LoadFromFile,
                100,
                ResourceHash::new(0xAABB_CCDD),
                60,
                ResourceHash::new(0x1122_3344),
            ))
            .resource(UpdatableResource::new(
                hero.clone(),
                LoadType::LoadFromMemoryAndQuickDecrypt,
                300,
                ResourceHash::new(5),
                300,
                ResourceHash::new(5),
            ))
            .asset(&ui, "ui/button.prefab", &[])
            .asset(&hero, "hero/model.prefab", &["ui/button.prefab"])
            .file_system("core", &ui)
            .group("base", &ui)
            .group("base", &hero)
            .build()
            .unwrap()
    }

    #[test]
    fn test_round_trip_latest() {
        let list = sample();
        let data = list.build().unwrap();
        assert_eq!(&data[..4], b"SRU\x02");
        assert_eq!(UpdatableVersionList::parse(&data).unwrap(), list);
    }

    #[test]
    fn test_peek_internal_version() {
        let err = sample().build_version(1).unwrap_err();
        // v1 cannot hold the file system table
        assert!(matches!(err, VersionListError::UnsupportedFeature { version: 1, .. }));

        let mut list = sample();
        list.file_systems.clear();
        for version in 0..=2 {
            if version == 0 {
                for resource in &mut list.resources {
                    resource.name = resource.name.with_extension(None);
                }
            }
            let data = list.build_version(version).unwrap();
            assert_eq!(UpdatableVersionList::peek_internal_version(&data).unwrap(), 7);
        }
    }

    #[test]
    fn test_compressed_flag() {
        let list = sample();
        assert!(list.resources[0].is_compressed());
        assert!(!list.resources[1].is_compressed());
    }

    #[test]
    fn test_keys_differ_but_content_matches() {
        let list = sample();
        let a = list.build_with_key(2, [1, 2, 3, 4]).unwrap();
        let b = list.build_with_key(2, [5, 6, 7, 8]).unwrap();
        assert_ne!(a, b);
        assert_eq!(
            UpdatableVersionList::parse(&a).unwrap(),
            UpdatableVersionList::parse(&b).unwrap()
        );
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let mut list = sample();
        list.assets[1].dependency_asset_indexes = vec![9];
        let err = list.build().unwrap_err();
        assert!(matches!(err, VersionListError::IndexOutOfRange { index: 9, .. }));
    }

    #[test]
    fn test_truncated_rejected() {
        let data = sample().build().unwrap();
        let err = UpdatableVersionList::parse(&data[..data.len() - 3]).unwrap_err();
        assert!(matches!(err, VersionListError::Truncated(_)));
    }
}
