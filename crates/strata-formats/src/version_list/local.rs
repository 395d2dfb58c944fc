//! Verified cache manifest
//!
//! Written by the updater for the read-write path and shipped in the
//! read-only path. It only records what is on disk: no assets, no groups.

use crate::load_type::LoadType;
use crate::name::ResourceName;
use crate::version_list::VersionListFormat;
use crate::version_list::codec::{ListReader, ListWriter, STRING_KEY_LENGTH};
use crate::version_list::error::Result;
use crate::version_list::header::{ListKind, VersionListHeader, check_build_version};
use crate::version_list::tables::{self, IndexedResource, VersionFileSystem};
use strata_crypto::ResourceHash;

/// Resource entry of a local manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalResource {
    /// Resource identity
    pub name: ResourceName,
    /// How the resource is loaded
    pub load_type: LoadType,
    /// Plain length
    pub length: u32,
    /// CRC-32 of the plain bytes
    pub hash: ResourceHash,
}

impl IndexedResource for LocalResource {
    fn resource_name(&self) -> &ResourceName {
        &self.name
    }

    fn asset_indexes(&self) -> &[u32] {
        &[]
    }

    fn set_asset_indexes(&mut self, _indexes: Vec<u32>) {}
}

/// Local manifest
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalVersionList {
    /// Verified resources
    pub resources: Vec<LocalResource>,
    /// Containers holding some of the resources
    pub file_systems: Vec<VersionFileSystem>,
}

impl LocalVersionList {
    /// Empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource, optionally recorded as stored in `file_system`
    pub fn push(&mut self, resource: LocalResource, file_system: Option<&str>) {
        let index = self.resources.len() as u32;
        self.resources.push(resource);

        let Some(file_system) = file_system else {
            return;
        };
        match self.file_systems.iter_mut().find(|fs| fs.name == file_system) {
            Some(entry) => entry.resource_indexes.push(index),
            None => self.file_systems.push(VersionFileSystem {
                name: file_system.to_string(),
                resource_indexes: vec![index],
            }),
        }
    }

    /// Container recorded for the resource at `index`
    pub fn file_system_of(&self, index: usize) -> Option<&str> {
        self.file_systems
            .iter()
            .find(|fs| fs.resource_indexes.contains(&(index as u32)))
            .map(|fs| fs.name.as_str())
    }

    fn validate(&self) -> Result<()> {
        tables::validate_resources(&self.resources, &[])?;
        tables::validate_file_systems(&self.file_systems, &self.resources)
    }
}

impl VersionListFormat for LocalVersionList {
    const KIND: ListKind = ListKind::Local;

    fn parse(data: &[u8]) -> Result<Self> {
        let (header, body) = VersionListHeader::parse(data, Self::KIND)?;
        let version = header.version;
        let mut reader = ListReader::new(body, Self::KIND.encoding(version))?;

        let (count, capacity) = reader.read_count()?;
        let mut resources = Vec::with_capacity(capacity);
        for _ in 0..count {
            let name = tables::read_resource_name(&mut reader, version >= 1)?;
            let load_type = LoadType::try_from(reader.read_u8()?)?;
            resources.push(LocalResource {
                name,
                load_type,
                length: reader.read_u32()?,
                hash: reader.read_hash()?,
            });
        }

        let file_systems = if version >= 2 {
            tables::read_file_systems(&mut reader)?
        } else {
            Vec::new()
        };
        reader.finish()?;

        let list = Self {
            resources,
            file_systems,
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

        writer.write_count(self.resources.len())?;
        for resource in &self.resources {
            tables::write_resource_name(&mut writer, &resource.name, version >= 1, version)?;
            writer.write_u8(resource.load_type.into())?;
            writer.write_u32(resource.length)?;
            writer.write_hash(resource.hash)?;
        }

        if version >= 2 {
            tables::write_file_systems(&mut writer, &self.file_systems)?;
        }

        Ok(writer.into_inner())
    }
}
