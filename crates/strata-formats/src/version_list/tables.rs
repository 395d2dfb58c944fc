//! Asset, file system and resource group tables shared by the list kinds

use crate::name::ResourceName;
use crate::version_list::codec::{ListReader, ListWriter, check_indexes};
use crate::version_list::error::{Result, VersionListError};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Asset entry with indexes into the asset table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionAsset {
    /// Asset name
    pub name: String,
    /// Assets this asset needs loaded first
    pub dependency_asset_indexes: Vec<u32>,
}

/// File system container entry with indexes into the resource table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFileSystem {
    /// Container name, stored on disk as `{name}.dat`
    pub name: String,
    /// Resources packed into this container
    pub resource_indexes: Vec<u32>,
}

/// Named resource group with indexes into the resource table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionResourceGroup {
    /// Group name, never empty
    pub name: String,
    /// Member resources
    pub resource_indexes: Vec<u32>,
}

/// Resource entry that owns assets
pub trait IndexedResource {
    /// Identity of the resource
    fn resource_name(&self) -> &ResourceName;

    /// Indexes of the assets stored in this resource
    fn asset_indexes(&self) -> &[u32];

    /// Replace the owned asset indexes
    fn set_asset_indexes(&mut self, indexes: Vec<u32>);
}

pub(crate) fn read_resource_name(
    reader: &mut ListReader<'_>,
    with_extension: bool,
) -> Result<ResourceName> {
    let name = reader.read_string("resource")?;
    let variant = reader.read_opt_string()?;
    let extension = if with_extension {
        reader.read_opt_string()?
    } else {
        None
    };
    Ok(ResourceName::new(name, variant, extension))
}

pub(crate) fn write_resource_name(
    writer: &mut ListWriter,
    name: &ResourceName,
    with_extension: bool,
    version: u8,
) -> Result<()> {
    writer.write_string(name.name(), "resource")?;
    writer.write_opt_string(name.variant())?;
    if with_extension {
        writer.write_opt_string(name.extension())?;
    } else if name.extension().is_some() {
        return Err(VersionListError::UnsupportedFeature {
            version,
            feature: "resource extensions",
        });
    }
    Ok(())
}

pub(crate) fn read_assets(reader: &mut ListReader<'_>) -> Result<Vec<VersionAsset>> {
    let (count, capacity) = reader.read_count()?;
    let mut assets = Vec::with_capacity(capacity);
    for _ in 0..count {
        assets.push(VersionAsset {
            name: reader.read_string("asset")?,
            dependency_asset_indexes: reader.read_indexes()?,
        });
    }
    Ok(assets)
}

pub(crate) fn write_assets(writer: &mut ListWriter, assets: &[VersionAsset]) -> Result<()> {
    writer.write_count(assets.len())?;
    for asset in assets {
        writer.write_string(&asset.name, "asset")?;
        writer.write_indexes(&asset.dependency_asset_indexes)?;
    }
    Ok(())
}

pub(crate) fn read_file_systems(reader: &mut ListReader<'_>) -> Result<Vec<VersionFileSystem>> {
    let (count, capacity) = reader.read_count()?;
    let mut file_systems = Vec::with_capacity(capacity);
    for _ in 0..count {
        file_systems.push(VersionFileSystem {
            name: reader.read_string("file system")?,
            resource_indexes: reader.read_indexes()?,
        });
    }
    Ok(file_systems)
}

pub(crate) fn write_file_systems(
    writer: &mut ListWriter,
    file_systems: &[VersionFileSystem],
) -> Result<()> {
    writer.write_count(file_systems.len())?;
    for file_system in file_systems {
        writer.write_string(&file_system.name, "file system")?;
        writer.write_indexes(&file_system.resource_indexes)?;
    }
    Ok(())
}

/// Fail when a schema without the file system table would drop entries
pub(crate) fn require_no_file_systems(file_systems: &[VersionFileSystem], version: u8) -> Result<()> {
    if file_systems.is_empty() {
        Ok(())
    } else {
        Err(VersionListError::UnsupportedFeature {
            version,
            feature: "file system table",
        })
    }
}

pub(crate) fn read_resource_groups(
    reader: &mut ListReader<'_>,
) -> Result<Vec<VersionResourceGroup>> {
    let (count, capacity) = reader.read_count()?;
    let mut groups = Vec::with_capacity(capacity);
    for _ in 0..count {
        groups.push(VersionResourceGroup {
            name: reader.read_string("resource group")?,
            resource_indexes: reader.read_indexes()?,
        });
    }
    Ok(groups)
}

pub(crate) fn write_resource_groups(
    writer: &mut ListWriter,
    groups: &[VersionResourceGroup],
) -> Result<()> {
    writer.write_count(groups.len())?;
    for group in groups {
        writer.write_string(&group.name, "resource group")?;
        writer.write_indexes(&group.resource_indexes)?;
    }
    Ok(())
}

/// Check names are unique and every dependency index is in range
pub(crate) fn validate_assets(assets: &[VersionAsset]) -> Result<()> {
    let mut seen = HashSet::with_capacity(assets.len());
    for asset in assets {
        if !seen.insert(asset.name.as_str()) {
            return Err(VersionListError::DuplicateAsset(asset.name.clone()));
        }
        check_indexes(&asset.dependency_asset_indexes, "asset", assets.len())?;
    }
    Ok(())
}

/// Check resource names are unique and each asset has at most one owner
pub(crate) fn validate_resources<R: IndexedResource>(resources: &[R], assets: &[VersionAsset]) -> Result<()> {
    let mut seen = HashSet::with_capacity(resources.len());
    let mut owned = vec![false; assets.len()];
    for resource in resources {
        if !seen.insert(resource.resource_name()) {
            return Err(VersionListError::DuplicateResource(
                resource.resource_name().full_name(),
            ));
        }
        check_indexes(resource.asset_indexes(), "asset", assets.len())?;
        for &index in resource.asset_indexes() {
            let slot = &mut owned[index as usize];
            if *slot {
                return Err(VersionListError::AmbiguousAssetOwner {
                    asset: assets[index as usize].name.clone(),
                });
            }
            *slot = true;
        }
    }
    Ok(())
}

/// Check file system indexes and that no resource sits in two containers
pub(crate) fn validate_file_systems<R: IndexedResource>(
    file_systems: &[VersionFileSystem],
    resources: &[R],
) -> Result<()> {
    let mut assigned = vec![false; resources.len()];
    for file_system in file_systems {
        check_indexes(&file_system.resource_indexes, "resource", resources.len())?;
        for &index in &file_system.resource_indexes {
            let slot = &mut assigned[index as usize];
            if *slot {
                return Err(VersionListError::AmbiguousFileSystem {
                    resource: resources[index as usize].resource_name().full_name(),
                });
            }
            *slot = true;
        }
    }
    Ok(())
}

pub(crate) fn validate_resource_groups(
    groups: &[VersionResourceGroup],
    resource_count: usize,
) -> Result<()> {
    for group in groups {
        check_indexes(&group.resource_indexes, "resource", resource_count)?;
    }
    Ok(())
}

/// Validated tables produced by [`TableBuilder`]
pub(crate) struct Tables<R> {
    pub assets: Vec<VersionAsset>,
    pub resources: Vec<R>,
    pub file_systems: Vec<VersionFileSystem>,
    pub resource_groups: Vec<VersionResourceGroup>,
}

struct PendingAsset {
    name: String,
    owner: ResourceName,
    dependencies: Vec<String>,
}

/// Name-based construction of the index tables
pub(crate) struct TableBuilder<R> {
    resources: Vec<R>,
    assets: Vec<PendingAsset>,
    file_systems: BTreeMap<String, Vec<ResourceName>>,
    groups: BTreeMap<String, Vec<ResourceName>>,
}

impl<R: IndexedResource> TableBuilder<R> {
    pub(crate) fn new() -> Self {
        Self {
            resources: Vec::new(),
            assets: Vec::new(),
            file_systems: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }

    pub(crate) fn add_resource(&mut self, resource: R) {
        self.resources.push(resource);
    }

    pub(crate) fn add_asset(&mut self, owner: &ResourceName, name: &str, dependencies: &[&str]) {
        self.assets.push(PendingAsset {
            name: name.to_string(),
            owner: owner.clone(),
            dependencies: dependencies.iter().map(|d| (*d).to_string()).collect(),
        });
    }

    pub(crate) fn add_to_file_system(&mut self, file_system: &str, resource: &ResourceName) {
        self.file_systems
            .entry(file_system.to_string())
            .or_default()
            .push(resource.clone());
    }

    pub(crate) fn add_to_group(&mut self, group: &str, resource: &ResourceName) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .push(resource.clone());
    }

    /// Resolve every name to its table index
    pub(crate) fn build(self) -> Result<Tables<R>> {
        let mut resource_indexes = HashMap::with_capacity(self.resources.len());
        for (index, resource) in self.resources.iter().enumerate() {
            if resource_indexes
                .insert(resource.resource_name().clone(), index as u32)
                .is_some()
            {
                return Err(VersionListError::DuplicateResource(
                    resource.resource_name().full_name(),
                ));
            }
        }

        let mut asset_indexes = HashMap::with_capacity(self.assets.len());
        for (index, asset) in self.assets.iter().enumerate() {
            if asset_indexes.insert(asset.name.as_str(), index as u32).is_some() {
                return Err(VersionListError::DuplicateAsset(asset.name.clone()));
            }
        }

        let lookup_resource = |name: &ResourceName| {
            resource_indexes
                .get(name)
                .copied()
                .ok_or_else(|| VersionListError::UnknownReference {
                    kind: "resource",
                    name: name.full_name(),
                })
        };

        let mut owned: Vec<Vec<u32>> = vec![Vec::new(); self.resources.len()];
        let mut assets = Vec::with_capacity(self.assets.len());
        for (index, pending) in self.assets.iter().enumerate() {
            let owner = lookup_resource(&pending.owner)?;
            owned[owner as usize].push(index as u32);

            let dependency_asset_indexes = pending
                .dependencies
                .iter()
                .map(|dependency| {
                    asset_indexes.get(dependency.as_str()).copied().ok_or_else(|| {
                        VersionListError::UnknownReference {
                            kind: "asset",
                            name: dependency.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            assets.push(VersionAsset {
                name: pending.name.clone(),
                dependency_asset_indexes,
            });
        }

        let mut resources = self.resources;
        for (resource, indexes) in resources.iter_mut().zip(owned) {
            resource.set_asset_indexes(indexes);
        }

        let file_systems = self
            .file_systems
            .iter()
            .map(|(name, members)| {
                Ok(VersionFileSystem {
                    name: name.clone(),
                    resource_indexes: members.iter().map(&lookup_resource).collect::<Result<_>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let resource_groups = self
            .groups
            .iter()
            .map(|(name, members)| {
                if name.is_empty() {
                    return Err(VersionListError::EmptyName("resource group"));
                }
                Ok(VersionResourceGroup {
                    name: name.clone(),
                    resource_indexes: members.iter().map(&lookup_resource).collect::<Result<_>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        validate_assets(&assets)?;
        validate_resources(&resources, &assets)?;
        validate_file_systems(&file_systems, &resources)?;

        Ok(Tables {
            assets,
            resources,
            file_systems,
            resource_groups,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Entry {
        name: ResourceName,
        assets: Vec<u32>,
    }

    impl IndexedResource for Entry {
        fn resource_name(&self) -> &ResourceName {
            &self.name
        }

        fn asset_indexes(&self) -> &[u32] {
            &self.assets
        }

        fn set_asset_indexes(&mut self, indexes: Vec<u32>) {
            self.assets = indexes;
        }
    }

    fn entry(name: &str) -> Entry {
        Entry {
            name: ResourceName::simple(name),
            assets: Vec::new(),
        }
    }

    #[test]
    fn test_builder_resolves_names() {
        let mut builder = TableBuilder::new();
        builder.add_resource(entry("ui"));
        builder.add_resource(entry("shared"));
        builder.add_asset(&ResourceName::simple("shared"), "font", &[]);
        builder.add_asset(&ResourceName::simple("ui"), "button", &["font"]);
        builder.add_to_group("base", &ResourceName::simple("ui"));
        builder.add_to_file_system("core", &ResourceName::simple("shared"));

        let tables = builder.build().unwrap();
        assert_eq!(tables.assets[1].dependency_asset_indexes, vec![0]);
        assert_eq!(tables.resources[0].assets, vec![1]);
        assert_eq!(tables.resources[1].assets, vec![0]);
        assert_eq!(tables.resource_groups[0].resource_indexes, vec![0]);
        assert_eq!(tables.file_systems[0].resource_indexes, vec![1]);
    }

    #[test]
    fn test_builder_unknown_dependency() {
        let mut builder = TableBuilder::new();
        builder.add_resource(entry("ui"));
        builder.add_asset(&ResourceName::simple("ui"), "button", &["missing"]);
        assert!(matches!(
            builder.build(),
            Err(VersionListError::UnknownReference { kind: "asset", .. })
        ));
    }

    #[test]
    fn test_builder_duplicate_resource() {
        let mut builder = TableBuilder::new();
        builder.add_resource(entry("ui"));
        builder.add_resource(entry("ui"));
        assert!(matches!(
            builder.build(),
            Err(VersionListError::DuplicateResource(_))
        ));
    }

    #[test]
    fn test_resource_in_two_file_systems() {
        let mut builder = TableBuilder::new();
        builder.add_resource(entry("ui"));
        builder.add_to_file_system("a", &ResourceName::simple("ui"));
        builder.add_to_file_system("b", &ResourceName::simple("ui"));
        assert!(matches!(
            builder.build(),
            Err(VersionListError::AmbiguousFileSystem { .. })
        ));
    }

    #[test]
    fn test_asset_with_two_owners() {
        let assets = vec![VersionAsset {
            name: "a".to_string(),
            dependency_asset_indexes: vec![],
        }];
        let resources = vec![
            Entry {
                name: ResourceName::simple("x"),
                assets: vec![0],
            },
            Entry {
                name: ResourceName::simple("y"),
                assets: vec![0],
            },
        ];
        assert!(matches!(
            validate_resources(&resources, &assets),
            Err(VersionListError::AmbiguousAssetOwner { .. })
        ));
    }
}
