//! Package mode
//!
//! Builds that never update ship a package list in the read-only path.
//! Everything it names is trusted as present, so the directory is populated
//! with every resource ready and stored read-only.

use crate::directory::{AssetInfo, ResourceInfo, ResourceStorage};
use crate::{PACKAGE_VERSION_LIST_FILE_NAME, Result, StorageError};
use std::collections::BTreeMap;
use std::fs;
use strata_formats::version_list::{PackageVersionList, VersionListFormat};
use tracing::info;

/// Populates the directory from the package list
#[derive(Debug, Default)]
pub struct ResourceIniter;

impl ResourceIniter {
    /// New initer
    pub fn new() -> Self {
        Self
    }

    /// Read `<read-only>/PackageList.dat` and populate `storage`
    ///
    /// Returns the number of resources registered.
    pub fn init_resources(&self, storage: &mut ResourceStorage) -> Result<usize> {
        let path = storage.config.read_only_dir()?.join(PACKAGE_VERSION_LIST_FILE_NAME);
        let data = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("package list {}", path.display()))
            } else {
                e.into()
            }
        })?;
        let list = PackageVersionList::parse(&data)?;
        self.init_from_list(storage, &list)
    }

    /// Populate `storage` from an already parsed package list
    pub fn init_from_list(&self, storage: &mut ResourceStorage, list: &PackageVersionList) -> Result<usize> {
        let current_variant = storage.config.current_variant.clone();
        let directory = &mut storage.directory;
        directory.clear();
        directory.set_version(list.applicable_version.clone(), list.internal_version);

        let mut file_systems: BTreeMap<u32, &str> = BTreeMap::new();
        for file_system in &list.file_systems {
            for &index in &file_system.resource_indexes {
                file_systems.insert(index, &file_system.name);
            }
        }

        let mut count = 0;
        for (index, resource) in list.resources.iter().enumerate() {
            if !resource.name.matches_variant(current_variant.as_deref()) {
                continue;
            }
            directory.add_resource(ResourceInfo::new(
                resource.name.clone(),
                file_systems.get(&(index as u32)).map(|s| (*s).to_string()),
                resource.load_type,
                resource.length,
                resource.hash,
                resource.length,
                true,
                true,
            ));
            directory.add_to_group("", resource.name.clone(), resource.length, resource.length);

            for &asset_index in &resource.asset_indexes {
                let Some(asset) = list.assets.get(asset_index as usize) else {
                    continue;
                };
                let dependencies = asset
                    .dependency_asset_indexes
                    .iter()
                    .filter_map(|&d| list.assets.get(d as usize))
                    .map(|d| d.name.clone())
                    .collect();
                directory.add_asset(AssetInfo::new(asset.name.clone(), resource.name.clone(), dependencies));
            }
            count += 1;
        }

        for group in &list.resource_groups {
            for &index in &group.resource_indexes {
                let Some(resource) = list.resources.get(index as usize) else {
                    continue;
                };
                if directory.resource(&resource.name).is_some() {
                    directory.add_to_group(&group.name, resource.name.clone(), resource.length, resource.length);
                }
            }
        }

        info!(
            "Package mode: {} resources, {} assets",
            count,
            directory.asset_count()
        );
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use strata_crypto::ResourceHash;
    use strata_formats::version_list::PackageResource;
    use strata_formats::{LoadType, ResourceName};
    use tempfile::TempDir;

    #[test]
    fn test_init_from_package_list() {
        let dir = TempDir::new().unwrap();
        let ui = ResourceName::new("ui", None::<&str>, Some("dat"));
        let hd = ResourceName::new("tex", Some("hd"), Some("dat"));
        let list = PackageVersionList::builder("1.0", 3)
            .resource(PackageResource::new(ui.clone(), LoadType::LoadFromFile, 10, ResourceHash::new(1)))
            .resource(PackageResource::new(hd.clone(), LoadType::LoadFromFile, 20, ResourceHash::new(2)))
            .asset(&ui, "ui/main.prefab", &[])
            .file_system("core", &ui)
            .group("base", &ui)
            .group("base", &hd)
            .build()
            .unwrap();
        fs::write(dir.path().join(PACKAGE_VERSION_LIST_FILE_NAME), list.build().unwrap()).unwrap();

        let mut storage = ResourceStorage::new(StorageConfig::new(dir.path(), dir.path().join("rw")));
        let count = ResourceIniter::new().init_resources(&mut storage).unwrap();
        assert_eq!(count, 1);

        let resource = storage.directory.resource_of_asset("ui/main.prefab").unwrap();
        assert!(resource.is_ready());
        assert!(resource.storage_in_read_only());
        assert_eq!(resource.file_system_name(), Some("core"));
        assert!(storage.directory.resource(&hd).is_none());
        assert_eq!(storage.directory.group("base").unwrap().total_count(), 1);
        assert_eq!(storage.directory.applicable_version(), Some("1.0"));
    }

    #[test]
    fn test_missing_package_list() {
        let dir = TempDir::new().unwrap();
        let mut storage = ResourceStorage::new(StorageConfig::new(dir.path(), dir.path()));
        assert!(matches!(
            ResourceIniter::new().init_resources(&mut storage),
            Err(StorageError::NotFound(_))
        ));
    }
}
