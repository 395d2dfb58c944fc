//! Resource directory: what this session knows about every asset and resource
//!
//! The checker and the initer populate the directory, the updater flips
//! resources to ready, and the loader only reads it. Readiness is monotone:
//! once verified, a resource stays ready for the rest of the session.

use crate::config::StorageConfig;
use crate::file_system::{FileSystemManager, FileSystemStore, file_system_path};
use crate::{Result, StorageError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use strata_crypto::ResourceHash;
use strata_formats::{LoadType, ResourceName};

/// One logical asset and where it lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    name: String,
    resource_name: ResourceName,
    dependency_asset_names: Vec<String>,
}

impl AssetInfo {
    /// Asset owned by `resource_name`
    pub fn new(
        name: impl Into<String>,
        resource_name: ResourceName,
        dependency_asset_names: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_name,
            dependency_asset_names,
        }
    }

    /// Asset name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning resource
    pub fn resource_name(&self) -> &ResourceName {
        &self.resource_name
    }

    /// Assets that must be loaded first
    pub fn dependency_asset_names(&self) -> &[String] {
        &self.dependency_asset_names
    }
}

/// One resource and its verified state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    name: ResourceName,
    file_system_name: Option<String>,
    load_type: LoadType,
    length: u32,
    hash: ResourceHash,
    compressed_length: u32,
    storage_in_read_only: bool,
    ready: bool,
}

impl ResourceInfo {
    /// Create a resource entry
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: ResourceName,
        file_system_name: Option<String>,
        load_type: LoadType,
        length: u32,
        hash: ResourceHash,
        compressed_length: u32,
        storage_in_read_only: bool,
        ready: bool,
    ) -> Self {
        Self {
            name,
            file_system_name,
            load_type,
            length,
            hash,
            compressed_length,
            storage_in_read_only,
            ready,
        }
    }

    /// Resource identity
    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    /// Container holding the resource, if it is not a loose file
    pub fn file_system_name(&self) -> Option<&str> {
        self.file_system_name.as_deref()
    }

    /// Whether the resource lives inside a file system container
    pub fn use_file_system(&self) -> bool {
        self.file_system_name.is_some()
    }

    /// Load type
    pub fn load_type(&self) -> LoadType {
        self.load_type
    }

    /// Whether the resource is raw bytes rather than a container
    pub fn is_load_from_binary(&self) -> bool {
        self.load_type.is_load_from_binary()
    }

    /// Plain length
    pub fn length(&self) -> u32 {
        self.length
    }

    /// CRC-32 of the plain bytes
    pub fn hash(&self) -> ResourceHash {
        self.hash
    }

    /// Served length
    pub fn compressed_length(&self) -> u32 {
        self.compressed_length
    }

    /// Whether the verified copy sits in the read-only path
    pub fn storage_in_read_only(&self) -> bool {
        self.storage_in_read_only
    }

    /// Whether the resource is present and verified
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Absolute path of the loose file, or of its container
    pub fn storage_path(&self, config: &StorageConfig) -> Result<PathBuf> {
        let root = if self.storage_in_read_only {
            config.read_only_dir()?
        } else {
            config.read_write_dir()?
        };
        Ok(match &self.file_system_name {
            Some(file_system) => file_system_path(root, file_system),
            None => root.join(self.name.file_name()),
        })
    }

    /// Name of the entry inside its container
    pub fn file_system_entry_name(&self) -> String {
        self.name.file_name()
    }
}

/// Named subset of resources
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceGroup {
    name: String,
    resources: BTreeSet<ResourceName>,
    total_length: u64,
    total_compressed_length: u64,
}

impl ResourceGroup {
    /// Empty group; the empty name is the default group
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Group name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member resources
    pub fn resource_names(&self) -> impl Iterator<Item = &ResourceName> {
        self.resources.iter()
    }

    /// Number of member resources
    pub fn total_count(&self) -> usize {
        self.resources.len()
    }

    /// Sum of plain lengths
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Sum of served lengths
    pub fn total_compressed_length(&self) -> u64 {
        self.total_compressed_length
    }

    /// Whether `name` is a member
    pub fn contains(&self, name: &ResourceName) -> bool {
        self.resources.contains(name)
    }

    pub(crate) fn add_resource(&mut self, name: ResourceName, length: u32, compressed_length: u32) {
        if self.resources.insert(name) {
            self.total_length += u64::from(length);
            self.total_compressed_length += u64::from(compressed_length);
        }
    }
}

/// Entry of the read-write index, persisted as the read-write list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadWriteResourceInfo {
    /// Container holding the resource, if any
    pub file_system_name: Option<String>,
    /// Load type
    pub load_type: LoadType,
    /// Plain length
    pub length: u32,
    /// CRC-32 of the plain bytes
    pub hash: ResourceHash,
}

/// Session-wide resource directory
#[derive(Debug, Default)]
pub struct ResourceDirectory {
    applicable_version: Option<String>,
    internal_version: u32,
    assets: HashMap<String, AssetInfo>,
    resources: HashMap<ResourceName, ResourceInfo>,
    groups: BTreeMap<String, ResourceGroup>,
    read_write: BTreeMap<ResourceName, ReadWriteResourceInfo>,
}

impl ResourceDirectory {
    /// Empty directory
    pub fn new() -> Self {
        let mut directory = Self::default();
        directory.groups.insert(String::new(), ResourceGroup::new(""));
        directory
    }

    /// Forget everything, keeping an empty default group
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Version the loaded manifest applies to
    pub fn applicable_version(&self) -> Option<&str> {
        self.applicable_version.as_deref()
    }

    /// Revision of the loaded manifest
    pub fn internal_version(&self) -> u32 {
        self.internal_version
    }

    pub(crate) fn set_version(&mut self, applicable_version: String, internal_version: u32) {
        self.applicable_version = Some(applicable_version);
        self.internal_version = internal_version;
    }

    /// Asset by name
    pub fn asset(&self, name: &str) -> Option<&AssetInfo> {
        self.assets.get(name)
    }

    /// Number of known assets
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Asset names in arbitrary order
    pub fn asset_names(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    pub(crate) fn add_asset(&mut self, asset: AssetInfo) {
        self.assets.insert(asset.name.clone(), asset);
    }

    /// Resource by identity
    pub fn resource(&self, name: &ResourceName) -> Option<&ResourceInfo> {
        self.resources.get(name)
    }

    /// Resource owning the asset `asset_name`
    pub fn resource_of_asset(&self, asset_name: &str) -> Option<&ResourceInfo> {
        self.assets
            .get(asset_name)
            .and_then(|asset| self.resources.get(&asset.resource_name))
    }

    /// Number of known resources
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Number of ready resources
    pub fn ready_count(&self) -> usize {
        self.resources.values().filter(|r| r.ready).count()
    }

    /// All resources in arbitrary order
    pub fn resources(&self) -> impl Iterator<Item = &ResourceInfo> {
        self.resources.values()
    }

    pub(crate) fn add_resource(&mut self, resource: ResourceInfo) {
        self.resources.insert(resource.name.clone(), resource);
    }

    /// Flip `name` to ready
    ///
    /// Returns false when it already was. Readiness never goes back.
    pub fn mark_ready(&mut self, name: &ResourceName) -> Result<bool> {
        let resource = self
            .resources
            .get_mut(name)
            .ok_or_else(|| StorageError::NotFound(format!("resource {}", name.full_name())))?;
        let changed = !resource.ready;
        resource.ready = true;
        Ok(changed)
    }

    /// Group by name; the empty name is the default group
    pub fn group(&self, name: &str) -> Option<&ResourceGroup> {
        self.groups.get(name)
    }

    /// All groups, default group first
    pub fn groups(&self) -> impl Iterator<Item = &ResourceGroup> {
        self.groups.values()
    }

    /// Ready members of `group`
    pub fn group_ready_count(&self, group: &ResourceGroup) -> usize {
        group
            .resource_names()
            .filter(|name| self.resources.get(*name).is_some_and(ResourceInfo::is_ready))
            .count()
    }

    /// Whether every member of `group` is ready
    pub fn is_group_ready(&self, group: &ResourceGroup) -> bool {
        self.group_ready_count(group) == group.total_count()
    }

    pub(crate) fn add_to_group(
        &mut self,
        group: &str,
        name: ResourceName,
        length: u32,
        compressed_length: u32,
    ) {
        self.groups
            .entry(group.to_string())
            .or_insert_with(|| ResourceGroup::new(group))
            .add_resource(name, length, compressed_length);
    }

    /// Entries persisted in the read-write list
    pub fn read_write_entries(&self) -> impl Iterator<Item = (&ResourceName, &ReadWriteResourceInfo)> {
        self.read_write.iter()
    }

    /// Read-write entry of `name`
    pub fn read_write_entry(&self, name: &ResourceName) -> Option<&ReadWriteResourceInfo> {
        self.read_write.get(name)
    }

    pub(crate) fn set_read_write(&mut self, name: ResourceName, info: ReadWriteResourceInfo) {
        self.read_write.insert(name, info);
    }
}

/// Shared session state handed to every component
#[derive(Debug)]
pub struct ResourceStorage {
    /// Storage configuration
    pub config: StorageConfig,
    /// Resource directory
    pub directory: ResourceDirectory,
    /// Open file system containers
    pub file_systems: FileSystemManager,
}

impl ResourceStorage {
    /// Fresh state for `config`
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            directory: ResourceDirectory::new(),
            file_systems: FileSystemManager::new(),
        }
    }

    /// Open the container holding `resource` for reading
    pub fn resource_file_system(&mut self, resource: &ResourceInfo) -> Result<&mut FileSystemStore> {
        let path = resource.storage_path(&self.config)?;
        let writable = !resource.storage_in_read_only();
        self.file_systems.load_file_system(&path, writable)
    }
}
