//! Manifest reconciliation
//!
//! The checker joins three manifests: the remote updatable list, the
//! read-only local list shipped with the build, and the read-write local list
//! of earlier downloads. They may arrive in any order, and either local list
//! may be absent. Reconciliation runs once all three have been fed.
//!
//! Every resource seen in any list becomes a [`CheckInfo`], classified by
//! [`CheckInfo::refresh_status`]. The checker then carries out the side
//! effects: moving cached copies between loose files and containers,
//! deleting stale copies, and handing update candidates to the updater.

use crate::directory::{AssetInfo, ReadWriteResourceInfo, ResourceInfo, ResourceStorage};
use crate::file_system::file_system_path;
use crate::read_write_list;
use crate::updater::{ResourceUpdater, UpdateInfo};
use crate::{Result, StorageError};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use strata_crypto::ResourceHash;
use strata_formats::version_list::{LocalVersionList, UpdatableVersionList, VersionListFormat};
use strata_formats::{LoadType, ResourceName};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Reconciled status of one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckStatus {
    /// Not classified yet
    #[default]
    Unknown,
    /// Verified copy in the read-only path
    StorageInReadOnly,
    /// Verified copy in the read-write path
    StorageInReadWrite,
    /// Needs downloading
    Update,
    /// Cached but no longer referenced by the remote manifest
    Disuse,
    /// Referenced, but for a variant this client does not run
    Unavailable,
}

/// Remote manifest view of one resource
#[derive(Debug, Clone, PartialEq, Eq)]
struct RemoteEntry {
    file_system: Option<String>,
    load_type: LoadType,
    length: u32,
    hash: ResourceHash,
    compressed_length: u32,
    compressed_hash: ResourceHash,
}

/// Local manifest view of one resource
#[derive(Debug, Clone, PartialEq, Eq)]
struct LocalEntry {
    file_system: Option<String>,
    load_type: LoadType,
    length: u32,
    hash: ResourceHash,
}

impl LocalEntry {
    fn matches(&self, remote: &RemoteEntry) -> bool {
        self.load_type == remote.load_type && self.length == remote.length && self.hash == remote.hash
    }
}

/// Up to three sightings of one resource and their verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInfo {
    name: ResourceName,
    status: CheckStatus,
    remote: Option<RemoteEntry>,
    read_only: Option<LocalEntry>,
    read_write: Option<LocalEntry>,
    need_remove: bool,
    need_move_to_disk: bool,
    need_move_to_file_system: bool,
}

impl CheckInfo {
    /// Unclassified entry for `name`
    pub fn new(name: ResourceName) -> Self {
        Self {
            name,
            status: CheckStatus::Unknown,
            remote: None,
            read_only: None,
            read_write: None,
            need_remove: false,
            need_move_to_disk: false,
            need_move_to_file_system: false,
        }
    }

    /// Record the remote manifest entry
    pub fn set_version_info(
        &mut self,
        file_system: Option<String>,
        load_type: LoadType,
        length: u32,
        hash: ResourceHash,
        compressed_length: u32,
        compressed_hash: ResourceHash,
    ) -> Result<()> {
        if self.remote.is_some() {
            return Err(self.duplicate("remote"));
        }
        self.remote = Some(RemoteEntry {
            file_system,
            load_type,
            length,
            hash,
            compressed_length,
            compressed_hash,
        });
        Ok(())
    }

    /// Record the read-only list entry
    pub fn set_read_only_info(
        &mut self,
        file_system: Option<String>,
        load_type: LoadType,
        length: u32,
        hash: ResourceHash,
    ) -> Result<()> {
        if self.read_only.is_some() {
            return Err(self.duplicate("read-only"));
        }
        self.read_only = Some(LocalEntry {
            file_system,
            load_type,
            length,
            hash,
        });
        Ok(())
    }

    /// Record the read-write list entry
    pub fn set_read_write_info(
        &mut self,
        file_system: Option<String>,
        load_type: LoadType,
        length: u32,
        hash: ResourceHash,
    ) -> Result<()> {
        if self.read_write.is_some() {
            return Err(self.duplicate("read-write"));
        }
        self.read_write = Some(LocalEntry {
            file_system,
            load_type,
            length,
            hash,
        });
        Ok(())
    }

    fn duplicate(&self, list: &str) -> StorageError {
        StorageError::Invariant(format!("{} listed twice in the {list} list", self.name))
    }

    /// Classify the resource and set the side-effect flags
    pub fn refresh_status(&mut self, current_variant: Option<&str>, ignore_other_variant: bool) {
        self.need_remove = false;
        self.need_move_to_disk = false;
        self.need_move_to_file_system = false;
        let read_write_exists = self.read_write.is_some();

        let Some(remote) = &self.remote else {
            self.status = CheckStatus::Disuse;
            self.need_remove = read_write_exists;
            return;
        };

        if !self.name.matches_variant(current_variant) {
            self.status = CheckStatus::Unavailable;
            self.need_remove = !ignore_other_variant && read_write_exists;
            return;
        }

        if let Some(read_only) = &self.read_only
            && read_only.file_system == remote.file_system
            && read_only.matches(remote)
        {
            self.status = CheckStatus::StorageInReadOnly;
            self.need_remove = read_write_exists;
            return;
        }

        if let Some(read_write) = &self.read_write
            && read_write.matches(remote)
        {
            let different_file_system = read_write.file_system != remote.file_system;
            self.status = CheckStatus::StorageInReadWrite;
            self.need_move_to_disk = read_write.file_system.is_some() && different_file_system;
            self.need_move_to_file_system = remote.file_system.is_some() && different_file_system;
            return;
        }

        self.status = CheckStatus::Update;
        self.need_remove = read_write_exists;
    }

    /// Resource identity
    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    /// Verdict of the last refresh
    pub fn status(&self) -> CheckStatus {
        self.status
    }

    /// The read-write copy must be deleted
    pub fn need_remove(&self) -> bool {
        self.need_remove
    }

    /// The read-write copy must leave its container for a loose file
    pub fn need_move_to_disk(&self) -> bool {
        self.need_move_to_disk
    }

    /// The read-write copy must enter the manifest's container
    pub fn need_move_to_file_system(&self) -> bool {
        self.need_move_to_file_system
    }

    /// Container assigned by the remote manifest
    pub fn file_system_name(&self) -> Option<&str> {
        self.remote.as_ref().and_then(|r| r.file_system.as_deref())
    }

    /// Container recorded in the read-write list
    pub fn read_write_file_system_name(&self) -> Option<&str> {
        self.read_write.as_ref().and_then(|r| r.file_system.as_deref())
    }
}

/// Aggregate outcome of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckSummary {
    /// Cached copies moved between loose files and containers
    pub moved_count: usize,
    /// Cached copies deleted
    pub removed_count: usize,
    /// Resources handed to the updater
    pub update_count: usize,
    /// Plain bytes to download
    pub update_total_length: u64,
    /// Served bytes to download
    pub update_total_compressed_length: u64,
    /// Resources of other variants
    pub unavailable_count: usize,
    /// Cached resources no longer referenced
    pub disuse_count: usize,
    /// Resources usable from the read-only path
    pub read_only_count: usize,
    /// Resources usable from the read-write path
    pub read_write_count: usize,
}

/// One-shot reconciliation of the three manifests
#[derive(Debug, Default)]
pub struct ResourceChecker {
    updatable: Option<Vec<u8>>,
    read_only: Option<Option<Vec<u8>>>,
    read_write: Option<Option<Vec<u8>>>,
    completed: bool,
}

impl ResourceChecker {
    /// Checker waiting for its three manifests
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the remote manifest bytes
    pub fn feed_updatable_version_list(&mut self, data: Vec<u8>) -> Result<()> {
        if self.updatable.is_some() {
            return Err(StorageError::Invariant(
                "updatable version list fed twice".to_string(),
            ));
        }
        self.updatable = Some(data);
        Ok(())
    }

    /// Feed the read-only list bytes, or `None` when the build ships none
    pub fn feed_read_only_version_list(&mut self, data: Option<Vec<u8>>) -> Result<()> {
        if self.read_only.is_some() {
            return Err(StorageError::Invariant(
                "read-only version list fed twice".to_string(),
            ));
        }
        self.read_only = Some(data);
        Ok(())
    }

    /// Feed the read-write list bytes, or `None` when nothing was cached yet
    pub fn feed_read_write_version_list(&mut self, data: Option<Vec<u8>>) -> Result<()> {
        if self.read_write.is_some() {
            return Err(StorageError::Invariant(
                "read-write version list fed twice".to_string(),
            ));
        }
        self.read_write = Some(data);
        Ok(())
    }

    /// Whether all three manifests have been fed
    pub fn is_ready(&self) -> bool {
        self.updatable.is_some() && self.read_only.is_some() && self.read_write.is_some()
    }

    /// Whether reconciliation already ran
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Reconcile once every manifest is in
    ///
    /// Returns `None` while a manifest is still missing; nothing fed so far
    /// is consumed. Populates the directory, registers update candidates and
    /// performs moves and removals. The fed manifests are consumed by the
    /// attempt, and the checker only counts as completed when it succeeds.
    pub fn poll(
        &mut self,
        storage: &mut ResourceStorage,
        updater: &mut ResourceUpdater,
    ) -> Result<Option<CheckSummary>> {
        if self.completed {
            return Err(StorageError::InvalidState(
                "resource check already completed".to_string(),
            ));
        }
        if !self.is_ready() {
            return Ok(None);
        }
        let (Some(updatable), Some(read_only), Some(read_write)) = (
            self.updatable.take(),
            self.read_only.take(),
            self.read_write.take(),
        ) else {
            return Ok(None);
        };

        let updatable = UpdatableVersionList::parse(&updatable)?;
        let read_only = read_only.map(|d| LocalVersionList::parse(&d)).transpose()?;
        let read_write = read_write.map(|d| LocalVersionList::parse(&d)).transpose()?;
        let summary = check(storage, updater, &updatable, read_only.as_ref(), read_write.as_ref())?;
        self.completed = true;
        Ok(Some(summary))
    }
}

fn collect_check_infos(
    updatable: &UpdatableVersionList,
    read_only: Option<&LocalVersionList>,
    read_write: Option<&LocalVersionList>,
) -> Result<BTreeMap<ResourceName, CheckInfo>> {
    let mut infos: BTreeMap<ResourceName, CheckInfo> = BTreeMap::new();

    let mut remote_file_systems: BTreeMap<u32, &str> = BTreeMap::new();
    for file_system in &updatable.file_systems {
        for &index in &file_system.resource_indexes {
            remote_file_systems.insert(index, &file_system.name);
        }
    }
    for (index, resource) in updatable.resources.iter().enumerate() {
        let file_system = remote_file_systems.get(&(index as u32)).map(|s| (*s).to_string());
        entry(&mut infos, &resource.name).set_version_info(
            file_system,
            resource.load_type,
            resource.length,
            resource.hash,
            resource.compressed_length,
            resource.compressed_hash,
        )?;
    }

    if let Some(list) = read_only {
        for (index, resource) in list.resources.iter().enumerate() {
            entry(&mut infos, &resource.name).set_read_only_info(
                list.file_system_of(index).map(str::to_string),
                resource.load_type,
                resource.length,
                resource.hash,
            )?;
        }
    }
    if let Some(list) = read_write {
        for (index, resource) in list.resources.iter().enumerate() {
            entry(&mut infos, &resource.name).set_read_write_info(
                list.file_system_of(index).map(str::to_string),
                resource.load_type,
                resource.length,
                resource.hash,
            )?;
        }
    }
    Ok(infos)
}

fn entry<'a>(infos: &'a mut BTreeMap<ResourceName, CheckInfo>, name: &ResourceName) -> &'a mut CheckInfo {
    infos
        .entry(name.clone())
        .or_insert_with(|| CheckInfo::new(name.clone()))
}

fn check(
    storage: &mut ResourceStorage,
    updater: &mut ResourceUpdater,
    updatable: &UpdatableVersionList,
    read_only: Option<&LocalVersionList>,
    read_write: Option<&LocalVersionList>,
) -> Result<CheckSummary> {
    let read_write_path = storage.config.read_write_dir()?.to_path_buf();
    let current_variant = storage.config.current_variant.clone();
    let ignore_other_variant = storage.config.ignore_other_variant;

    let mut infos = collect_check_infos(updatable, read_only, read_write)?;
    storage.directory.clear();
    storage
        .directory
        .set_version(updatable.applicable_version.clone(), updatable.internal_version);

    let mut summary = CheckSummary::default();
    let mut touched_file_systems = BTreeSet::new();
    let mut included = BTreeSet::new();
    let mut lost_count = 0usize;

    for info in infos.values_mut() {
        info.refresh_status(current_variant.as_deref(), ignore_other_variant);
        debug!("{} -> {:?}", info.name, info.status);

        if info.need_remove {
            remove_read_write_copy(storage, &read_write_path, info, &mut touched_file_systems)?;
            summary.removed_count += 1;
        }

        if info.status == CheckStatus::StorageInReadWrite
            && (info.need_move_to_disk || info.need_move_to_file_system)
        {
            if move_read_write_copy(storage, &read_write_path, info, &mut touched_file_systems)? {
                summary.moved_count += 1;
            } else {
                warn!("Cached copy of {} is missing, downloading it again", info.name);
                info.status = CheckStatus::Update;
                lost_count += 1;
            }
        }

        let Some(remote) = info.remote.clone() else {
            summary.disuse_count += 1;
            continue;
        };
        let (storage_in_read_only, ready) = match info.status {
            CheckStatus::StorageInReadOnly => {
                summary.read_only_count += 1;
                (true, true)
            }
            CheckStatus::StorageInReadWrite => {
                storage.directory.set_read_write(
                    info.name.clone(),
                    ReadWriteResourceInfo {
                        file_system_name: remote.file_system.clone(),
                        load_type: remote.load_type,
                        length: remote.length,
                        hash: remote.hash,
                    },
                );
                summary.read_write_count += 1;
                (false, true)
            }
            CheckStatus::Update => {
                updater.add_candidate(UpdateInfo::new(
                    info.name.clone(),
                    remote.file_system.clone(),
                    remote.load_type,
                    remote.length,
                    remote.hash,
                    remote.compressed_length,
                    remote.compressed_hash,
                ));
                summary.update_count += 1;
                summary.update_total_length += u64::from(remote.length);
                summary.update_total_compressed_length += u64::from(remote.compressed_length);
                (false, false)
            }
            CheckStatus::Unavailable => {
                summary.unavailable_count += 1;
                continue;
            }
            CheckStatus::Disuse | CheckStatus::Unknown => continue,
        };

        storage.directory.add_resource(ResourceInfo::new(
            info.name.clone(),
            remote.file_system,
            remote.load_type,
            remote.length,
            remote.hash,
            remote.compressed_length,
            storage_in_read_only,
            ready,
        ));
        included.insert(info.name.clone());
    }

    populate_assets_and_groups(storage, updatable, &included);

    if summary.moved_count > 0 || summary.removed_count > 0 || lost_count > 0 {
        for path in &touched_file_systems {
            let empty = storage
                .file_systems
                .file_system(path)
                .is_some_and(|store| store.is_empty());
            if empty {
                storage.file_systems.destroy_file_system(path, true)?;
            }
        }
        prune_empty_directories(&read_write_path);
        read_write_list::generate(&read_write_path, &storage.directory)?;
    }

    info!(
        "Resource check complete: {} read-only, {} read-write, {} to update, {} moved, {} removed",
        summary.read_only_count,
        summary.read_write_count,
        summary.update_count,
        summary.moved_count,
        summary.removed_count
    );
    Ok(summary)
}

fn populate_assets_and_groups(
    storage: &mut ResourceStorage,
    updatable: &UpdatableVersionList,
    included: &BTreeSet<ResourceName>,
) {
    for resource in &updatable.resources {
        if !included.contains(&resource.name) {
            continue;
        }
        for &index in &resource.asset_indexes {
            let Some(asset) = updatable.assets.get(index as usize) else {
                continue;
            };
            let dependencies = asset
                .dependency_asset_indexes
                .iter()
                .filter_map(|&d| updatable.assets.get(d as usize))
                .map(|d| d.name.clone())
                .collect();
            storage.directory.add_asset(AssetInfo::new(
                asset.name.clone(),
                resource.name.clone(),
                dependencies,
            ));
        }
        storage.directory.add_to_group(
            "",
            resource.name.clone(),
            resource.length,
            resource.compressed_length,
        );
    }

    for group in &updatable.resource_groups {
        for &index in &group.resource_indexes {
            let Some(resource) = updatable.resources.get(index as usize) else {
                continue;
            };
            if included.contains(&resource.name) {
                storage.directory.add_to_group(
                    &group.name,
                    resource.name.clone(),
                    resource.length,
                    resource.compressed_length,
                );
            }
        }
    }
}

fn remove_read_write_copy(
    storage: &mut ResourceStorage,
    read_write_path: &Path,
    info: &CheckInfo,
    touched: &mut BTreeSet<PathBuf>,
) -> Result<()> {
    let entry_name = info.name.file_name();
    match info.read_write_file_system_name() {
        Some(file_system) => {
            let path = file_system_path(read_write_path, file_system);
            if path.exists() {
                storage
                    .file_systems
                    .load_file_system(&path, true)?
                    .delete_file(&entry_name)?;
                touched.insert(path);
            }
        }
        None => {
            let path = read_write_path.join(&entry_name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    debug!("Removed cached {}", info.name);
    Ok(())
}

/// Move the cached copy of `info` to where the manifest wants it
///
/// Returns false when the copy the read-write list describes is gone.
fn move_read_write_copy(
    storage: &mut ResourceStorage,
    read_write_path: &Path,
    info: &CheckInfo,
    touched: &mut BTreeSet<PathBuf>,
) -> Result<bool> {
    let entry_name = info.name.file_name();
    let loose = read_write_path.join(&entry_name);

    if info.need_move_to_disk
        && let Some(file_system) = info.read_write_file_system_name()
    {
        let path = file_system_path(read_write_path, file_system);
        if !path.is_file() {
            return Ok(false);
        }
        let store = storage.file_systems.load_file_system(&path, true)?;
        touched.insert(path);
        if !store.save_as_file(&entry_name, &loose)? {
            return Ok(false);
        }
        store.delete_file(&entry_name)?;
    }

    if info.need_move_to_file_system
        && let Some(file_system) = info.file_system_name()
    {
        if !loose.is_file() {
            return Ok(false);
        }
        let path = file_system_path(read_write_path, file_system);
        let store = storage.file_systems.open_or_create(&path)?;
        touched.insert(path);
        if !store.write_file_from_path(&entry_name, &loose)? {
            return Ok(false);
        }
        fs::remove_file(&loose)?;
    }

    debug!("Moved cached {}", info.name);
    Ok(true)
}

fn prune_empty_directories(root: &Path) {
    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(std::result::Result::ok)
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let empty = fs::read_dir(entry.path()).is_ok_and(|mut d| d.next().is_none());
        if empty && let Err(e) = fs::remove_dir(entry.path()) {
            warn!("Failed to remove {}: {}", entry.path().display(), e);
        }
    }
}
