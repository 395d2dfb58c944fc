//! Resource pack table of contents
//!
//! A resource pack is one file carrying many served resources, used to
//! update a client without per-resource downloads:
//!
//! ```text
//! header          SRK + version 0
//! key             [u8; 4]
//! data_offset     u64 LE, absolute offset of the data region
//! data_length     u64 LE
//! data_hash       u32 LE, CRC-32 of the data region
//! resources       count * { name, variant, ext, load_type u8, offset var,
//!                           length var, hash u32, zip_length var,
//!                           zip_hash u32 }
//! data            data_length bytes
//! ```
//!
//! Resource offsets are relative to the data region.

use crate::compression::CompressionError;
use crate::load_type::LoadType;
use crate::name::ResourceName;
use crate::payload::ResourcePayload;
use crate::version_list::VersionListFormat;
use crate::version_list::codec::{ListReader, ListWriter, STRING_KEY_LENGTH};
use crate::version_list::error::{Result, VersionListError};
use crate::version_list::header::{HEADER_LENGTH, ListKind, VersionListHeader, check_build_version};
use crate::version_list::tables;
use std::collections::HashSet;
use std::io::Read;
use strata_crypto::ResourceHash;

/// Bytes before the variable part of the list: header, key, data offset
const FIXED_PREFIX_LENGTH: usize = HEADER_LENGTH + STRING_KEY_LENGTH + 8;

/// Resource entry of a resource pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackResource {
    /// Resource identity
    pub name: ResourceName,
    /// How the resource is loaded
    pub load_type: LoadType,
    /// Offset of the served bytes within the data region
    pub offset: u64,
    /// Plain length
    pub length: u32,
    /// CRC-32 of the plain bytes
    pub hash: ResourceHash,
    /// Served length
    pub compressed_length: u32,
    /// CRC-32 of the served bytes
    pub compressed_hash: ResourceHash,
}

impl PackResource {
    /// Whether the packed bytes are compressed
    pub fn is_compressed(&self) -> bool {
        self.length != self.compressed_length || self.hash != self.compressed_hash
    }
}

/// Resource pack table of contents
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourcePackVersionList {
    /// Absolute offset of the data region
    pub data_offset: u64,
    /// Length of the data region
    pub data_length: u64,
    /// CRC-32 of the data region
    pub data_hash: ResourceHash,
    /// Packed resources
    pub resources: Vec<PackResource>,
}

impl ResourcePackVersionList {
    /// Read the table of contents from the start of a pack stream
    ///
    /// Leaves the reader positioned at the data region.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut prefix = [0u8; FIXED_PREFIX_LENGTH];
        reader.read_exact(&mut prefix)?;
        VersionListHeader::parse(&prefix, ListKind::ResourcePack)?;

        let mut offset_bytes = [0u8; 8];
        offset_bytes.copy_from_slice(&prefix[HEADER_LENGTH + STRING_KEY_LENGTH..]);
        let data_offset = u64::from_le_bytes(offset_bytes);
        if data_offset < FIXED_PREFIX_LENGTH as u64 {
            return Err(VersionListError::Truncated(format!(
                "data offset {data_offset} inside list header"
            )));
        }

        let mut list = prefix.to_vec();
        reader
            .take(data_offset - FIXED_PREFIX_LENGTH as u64)
            .read_to_end(&mut list)?;
        Self::parse(&list)
    }

    /// Check a data region against the recorded length and hash
    pub fn verify_data(&self, data: &[u8]) -> Result<()> {
        if data.len() as u64 != self.data_length {
            return Err(VersionListError::PackDataMismatch(format!(
                "length {} != {}",
                data.len(),
                self.data_length
            )));
        }
        let hash = ResourceHash::of(data);
        if hash != self.data_hash {
            return Err(VersionListError::PackDataMismatch(format!(
                "hash {hash} != {}",
                self.data_hash
            )));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.resources.len());
        for resource in &self.resources {
            if !seen.insert(&resource.name) {
                return Err(VersionListError::DuplicateResource(resource.name.full_name()));
            }
            let end = resource.offset.saturating_add(u64::from(resource.compressed_length));
            if end > self.data_length {
                return Err(VersionListError::PackDataMismatch(format!(
                    "{} ends at {end}, past data length {}",
                    resource.name.full_name(),
                    self.data_length
                )));
            }
        }
        Ok(())
    }

    fn write_list(
        &self,
        version: u8,
        key: [u8; STRING_KEY_LENGTH],
        data_offset: u64,
    ) -> Result<Vec<u8>> {
        let header = VersionListHeader::new(Self::KIND, version).to_bytes()?;
        let mut writer = ListWriter::new(header, key, Self::KIND.encoding(version))?;

        writer.write_fixed_u64(data_offset)?;
        writer.write_fixed_u64(self.data_length)?;
        writer.write_hash(self.data_hash)?;
        writer.write_count(self.resources.len())?;
        for resource in &self.resources {
            tables::write_resource_name(&mut writer, &resource.name, true, version)?;
            writer.write_u8(resource.load_type.into())?;
            writer.write_u64(resource.offset)?;
            writer.write_u32(resource.length)?;
            writer.write_hash(resource.hash)?;
            writer.write_u32(resource.compressed_length)?;
            writer.write_hash(resource.compressed_hash)?;
        }
        Ok(writer.into_inner())
    }
}

impl VersionListFormat for ResourcePackVersionList {
    const KIND: ListKind = ListKind::ResourcePack;

    /// Parse the table of contents; a following data region is ignored
    fn parse(data: &[u8]) -> Result<Self> {
        let (header, body) = VersionListHeader::parse(data, Self::KIND)?;
        let mut reader = ListReader::new(body, Self::KIND.encoding(header.version))?;

        let data_offset = reader.read_fixed_u64()?;
        let data_length = reader.read_fixed_u64()?;
        let data_hash = reader.read_hash()?;

        let (count, capacity) = reader.read_count()?;
        let mut resources = Vec::with_capacity(capacity);
        for _ in 0..count {
            let name = tables::read_resource_name(&mut reader, true)?;
            let load_type = LoadType::try_from(reader.read_u8()?)?;
            resources.push(PackResource {
                name,
                load_type,
                offset: reader.read_u64()?,
                length: reader.read_u32()?,
                hash: reader.read_hash()?,
                compressed_length: reader.read_u32()?,
                compressed_hash: reader.read_hash()?,
            });
        }

        let consumed = (HEADER_LENGTH as u64) + reader.position();
        if consumed != data_offset {
            return Err(VersionListError::PackDataMismatch(format!(
                "list ends at {consumed}, data offset is {data_offset}"
            )));
        }

        let list = Self {
            data_offset,
            data_length,
            data_hash,
            resources,
        };
        list.validate()?;
        Ok(list)
    }

    /// Serialize the table of contents, recomputing the data offset
    fn build_with_key(&self, version: u8, key: [u8; STRING_KEY_LENGTH]) -> Result<Vec<u8>> {
        check_build_version(Self::KIND, version)?;
        self.validate()?;

        // The offset field is fixed width, so its value never changes the list length
        let length = self.write_list(version, key, 0)?.len() as u64;
        self.write_list(version, key, length)
    }
}

/// Builds a complete resource pack file
#[derive(Debug, Default)]
pub struct ResourcePackBuilder {
    entries: Vec<(ResourceName, LoadType, Vec<u8>, bool)>,
}

impl ResourcePackBuilder {
    /// Empty pack
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource from its plain bytes
    #[must_use]
    pub fn resource(
        mut self,
        name: ResourceName,
        load_type: LoadType,
        plain: &[u8],
        compress: bool,
    ) -> Self {
        self.entries.push((name, load_type, plain.to_vec(), compress));
        self
    }

    /// Encode every resource and produce the pack file bytes
    pub fn build(self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut resources = Vec::with_capacity(self.entries.len());
        for (name, load_type, plain, compress) in self.entries {
            let payload = ResourcePayload::encode(load_type, &plain, compress)
                .map_err(|e: CompressionError| VersionListError::BinRead(e.to_string()))?;
            resources.push(PackResource {
                name,
                load_type,
                offset: data.len() as u64,
                length: payload.length,
                hash: payload.hash,
                compressed_length: payload.compressed_length,
                compressed_hash: payload.compressed_hash,
            });
            data.extend_from_slice(&payload.bytes);
        }

        let list = ResourcePackVersionList {
            data_offset: 0,
            data_length: data.len() as u64,
            data_hash: ResourceHash::of(&data),
            resources,
        };
        let mut file = list.build()?;
        file.extend_from_slice(&data);
        Ok(file)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pack() -> Vec<u8> {
        ResourcePackBuilder::new()
            .resource(
                ResourceName::new("ui", None::<&str>, Some("dat")),
                LoadType::LoadFromFile,
                b"user interface",
                false,
            )
            .resource(
                ResourceName::new("hero", Some("hd"), Some("dat")),
                LoadType::LoadFromMemoryAndQuickDecrypt,
                &b"hero".repeat(200),
                true,
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_read_from_stops_at_data() {
        let file = pack();
        let mut cursor = Cursor::new(&file);
        let list = ResourcePackVersionList::read_from(&mut cursor).unwrap();
        assert_eq!(cursor.position(), list.data_offset);
        assert_eq!(list.resources.len(), 2);

        let region = &file[list.data_offset as usize..];
        list.verify_data(region).unwrap();

        let ui = &list.resources[0];
        assert!(!ui.is_compressed());
        let start = ui.offset as usize;
        assert_eq!(&region[start..start + ui.length as usize], b"user interface");
        assert!(list.resources[1].is_compressed());
    }

    #[test]
    fn test_parse_matches_read_from() {
        let file = pack();
        let parsed = ResourcePackVersionList::parse(&file).unwrap();
        let read = ResourcePackVersionList::read_from(&mut Cursor::new(&file)).unwrap();
        assert_eq!(parsed, read);
    }

    #[test]
    fn test_corrupt_data_detected() {
        let mut file = pack();
        let last = file.len() - 1;
        file[last] ^= 0xFF;
        let list = ResourcePackVersionList::parse(&file).unwrap();
        let region = &file[list.data_offset as usize..];
        assert!(matches!(
            list.verify_data(region),
            Err(VersionListError::PackDataMismatch(_))
        ));
    }

    #[test]
    fn test_entry_past_region_rejected() {
        let mut list = ResourcePackVersionList::parse(&pack()).unwrap();
        list.resources[0].offset = list.data_length;
        assert!(list.build().is_err());
    }
}
