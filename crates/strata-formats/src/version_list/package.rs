//! Bundled manifest of a non-updatable build
//!
//! Same layout as the updatable list without the compressed length and hash,
//! since packaged resources are never transferred.

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

/// Resource entry of a package manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResource {
    /// Resource identity
    pub name: ResourceName,
    /// How the resource is loaded
    pub load_type: LoadType,
    /// Plain length
    pub length: u32,
    /// CRC-32 of the plain bytes
    pub hash: ResourceHash,
    /// Assets stored in this resource
    pub asset_indexes: Vec<u32>,
}

impl PackageResource {
    /// Resource entry without assets
    pub fn new(name: ResourceName, load_type: LoadType, length: u32, hash: ResourceHash) -> Self {
        Self {
            name,
            load_type,
            length,
            hash,
            asset_indexes: Vec::new(),
        }
    }
}

impl IndexedResource for PackageResource {
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

/// Package manifest
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageVersionList {
    /// Game version the package was built for
    pub applicable_version: String,
    /// Manifest revision
    pub internal_version: u32,
    /// Asset table
    pub assets: Vec<VersionAsset>,
    /// Resource table
    pub resources: Vec<PackageResource>,
    /// File system container table
    pub file_systems: Vec<VersionFileSystem>,
    /// Named resource groups
    pub resource_groups: Vec<VersionResourceGroup>,
}

impl PackageVersionList {
    /// Builder resolving assets, containers and groups by name
    pub fn builder(
        applicable_version: impl Into<String>,
        internal_version: u32,
    ) -> PackageVersionListBuilder {
        PackageVersionListBuilder {
            applicable_version: applicable_version.into(),
            internal_version,
            tables: TableBuilder::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        tables::validate_assets(&self.assets)?;
        tables::validate_resources(&self.resources, &self.assets)?;
        tables::validate_file_systems(&self.file_systems, &self.resources)?;
        tables::validate_resource_groups(&self.resource_groups, self.resources.len())
    }
}

impl VersionListFormat for PackageVersionList {
    const KIND: ListKind = ListKind::Package;

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
            resources.push(PackageResource {
                name,
                load_type,
                length: reader.read_u32()?,
                hash: reader.read_hash()?,
                asset_indexes: reader.read_indexes()?,
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
            writer.write_indexes(&resource.asset_indexes)?;
        }

        if version >= 2 {
            tables::write_file_systems(&mut writer, &self.file_systems)?;
        }
        tables::write_resource_groups(&mut writer, &self.resource_groups)?;

        Ok(writer.into_inner())
    }
}

/// Builder for [`PackageVersionList`]
pub struct PackageVersionListBuilder {
    applicable_version: String,
    internal_version: u32,
    tables: TableBuilder<PackageResource>,
}

impl PackageVersionListBuilder {
    /// Add a resource entry
    #[must_use]
    pub fn resource(mut self, resource: PackageResource) -> Self {
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
    pub fn build(self) -> Result<PackageVersionList> {
        let tables = self.tables.build()?;
        Ok(PackageVersionList {
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

    #[test]
    fn test_round_trip_v0() {
        let atlas = ResourceName::simple("atlas");
        let list = PackageVersionList::builder("2.1", 3)
            .resource(PackageResource::new(
                atlas.clone(),
                LoadType::LoadFromBinary,
                12,
                ResourceHash::new(99),
            ))
            .asset(&atlas, "atlas.bytes", &[])
            .build()
            .unwrap();

        let data = list.build_version(0).unwrap();
        assert_eq!(&data[..4], b"SRP\x00");
        assert_eq!(PackageVersionList::parse(&data).unwrap(), list);
    }

    #[test]
    fn test_v0_rejects_extensions() {
        let name = ResourceName::new("atlas", None::<&str>, Some("dat"));
        let list = PackageVersionList::builder("2.1", 3)
            .resource(PackageResource::new(name, LoadType::LoadFromFile, 1, ResourceHash::new(1)))
            .build()
            .unwrap();
        assert!(matches!(
            list.build_version(0),
            Err(VersionListError::UnsupportedFeature { version: 0, .. })
        ));
        assert!(list.build_version(1).is_ok());
    }

    #[test]
    fn test_wrong_magic() {
        let data = crate::version_list::UpdatableVersionList::builder("2.1", 3)
            .build()
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(
            PackageVersionList::parse(&data),
            Err(VersionListError::InvalidMagic { .. })
        ));
    }
}
