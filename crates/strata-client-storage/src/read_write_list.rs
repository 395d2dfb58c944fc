//! Persisting the read-write list
//!
//! Regeneration writes the new list to a `.tmp` sibling, renames the current
//! file to a `.bak` sibling, renames the temporary file into place, then
//! deletes the backup. A primary file is therefore always complete. A backup
//! found at startup without a primary means the previous session died
//! between the two renames.

use crate::directory::ResourceDirectory;
use crate::{BACKUP_EXTENSION, LOCAL_VERSION_LIST_FILE_NAME, Result, TEMP_EXTENSION};
use std::fs;
use std::path::{Path, PathBuf};
use strata_formats::version_list::{LocalResource, LocalVersionList, VersionListFormat};
use tracing::{debug, info, warn};

/// Path of the read-write list under `read_write_path`
pub fn list_path(read_write_path: &Path) -> PathBuf {
    read_write_path.join(LOCAL_VERSION_LIST_FILE_NAME)
}

/// Path of the backup kept during regeneration
pub fn backup_path(read_write_path: &Path) -> PathBuf {
    read_write_path.join(format!("{LOCAL_VERSION_LIST_FILE_NAME}.{BACKUP_EXTENSION}"))
}

/// Path the new list is written to before it replaces the primary
pub fn temp_path(read_write_path: &Path) -> PathBuf {
    read_write_path.join(format!("{LOCAL_VERSION_LIST_FILE_NAME}.{TEMP_EXTENSION}"))
}

/// Local list describing every read-write entry of `directory`
pub fn build_list(directory: &ResourceDirectory) -> LocalVersionList {
    let mut list = LocalVersionList::new();
    for (name, info) in directory.read_write_entries() {
        list.push(
            LocalResource {
                name: name.clone(),
                load_type: info.load_type,
                length: info.length,
                hash: info.hash,
            },
            info.file_system_name.as_deref(),
        );
    }
    list
}

/// Rewrite the read-write list from `directory`
///
/// On failure the previous list is left in place.
pub fn generate(read_write_path: &Path, directory: &ResourceDirectory) -> Result<()> {
    let path = list_path(read_write_path);
    let backup = backup_path(read_write_path);
    let temp = temp_path(read_write_path);
    let data = build_list(directory).build()?;

    if let Err(e) = write_list(&temp, &data) {
        warn!("Failed to write read-write list {}: {}", temp.display(), e);
        remove_leftover(&temp);
        return Err(e);
    }

    if path.exists() {
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        fs::rename(&path, &backup)?;
    }

    if let Err(e) = fs::rename(&temp, &path) {
        warn!("Failed to replace read-write list {}: {}", path.display(), e);
        remove_leftover(&temp);
        if backup.exists() && !path.exists() {
            fs::rename(&backup, &path)?;
        }
        return Err(e.into());
    }

    if backup.exists() {
        fs::remove_file(&backup)?;
    }
    debug!(
        "Generated read-write list {} with {} resources",
        path.display(),
        directory.read_write_entries().count()
    );
    Ok(())
}

fn write_list(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    Ok(())
}

fn remove_leftover(path: &Path) {
    if !path.is_file() {
        return;
    }
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

/// Restore the list from a backup left by an interrupted regeneration
///
/// Returns true when the backup was promoted. The backup is only promoted
/// when no primary exists; a primary is only ever renamed into place once
/// fully written, so a backup next to it is stale and gets deleted.
pub fn recover_backup(read_write_path: &Path) -> Result<bool> {
    remove_leftover(&temp_path(read_write_path));

    let backup = backup_path(read_write_path);
    if !backup.exists() {
        return Ok(false);
    }
    let path = list_path(read_write_path);
    if path.exists() {
        debug!("Removing stale backup {}", backup.display());
        fs::remove_file(&backup)?;
        return Ok(false);
    }
    fs::rename(&backup, &path)?;
    info!("Recovered read-write list from {}", backup.display());
    Ok(true)
}

/// Raw bytes of the read-write list, if present
pub fn read(read_write_path: &Path) -> Result<Option<Vec<u8>>> {
    read_optional(&list_path(read_write_path))
}

pub(crate) fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::directory::ReadWriteResourceInfo;
    use strata_crypto::ResourceHash;
    use strata_formats::{LoadType, ResourceName};
    use tempfile::TempDir;

    fn directory_with(names: &[&str]) -> ResourceDirectory {
        let mut directory = ResourceDirectory::new();
        for (i, name) in names.iter().enumerate() {
            directory.set_read_write(
                ResourceName::new(*name, None::<&str>, Some("dat")),
                ReadWriteResourceInfo {
                    file_system_name: (i % 2 == 1).then(|| "cache".to_string()),
                    load_type: LoadType::LoadFromFile,
                    length: i as u32,
                    hash: ResourceHash::new(i as u32),
                },
            );
        }
        directory
    }

    #[test]
    fn test_generate_and_read_back() {
        let dir = TempDir::new().unwrap();
        generate(dir.path(), &directory_with(&["a", "b", "c"])).unwrap();

        let list = LocalVersionList::parse(&read(dir.path()).unwrap().unwrap()).unwrap();
        assert_eq!(list.resources.len(), 3);
        assert_eq!(list.file_system_of(1), Some("cache"));
        assert!(!backup_path(dir.path()).exists());

        generate(dir.path(), &directory_with(&["a"])).unwrap();
        let list = LocalVersionList::parse(&read(dir.path()).unwrap().unwrap()).unwrap();
        assert_eq!(list.resources.len(), 1);
        assert!(!backup_path(dir.path()).exists());
        assert!(!temp_path(dir.path()).exists());
    }

    #[test]
    fn test_recover_promotes_backup() {
        let dir = TempDir::new().unwrap();
        assert!(!recover_backup(dir.path()).unwrap());

        fs::write(backup_path(dir.path()), b"complete").unwrap();
        assert!(recover_backup(dir.path()).unwrap());
        assert_eq!(fs::read(list_path(dir.path())).unwrap(), b"complete");
        assert!(!backup_path(dir.path()).exists());
    }

    #[test]
    fn test_recover_keeps_existing_primary() {
        let dir = TempDir::new().unwrap();
        fs::write(list_path(dir.path()), b"current").unwrap();
        fs::write(backup_path(dir.path()), b"stale").unwrap();
        fs::write(temp_path(dir.path()), b"partial").unwrap();

        assert!(!recover_backup(dir.path()).unwrap());
        assert_eq!(fs::read(list_path(dir.path())).unwrap(), b"current");
        assert!(!backup_path(dir.path()).exists());
        assert!(!temp_path(dir.path()).exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_list() {
        let dir = TempDir::new().unwrap();
        generate(dir.path(), &directory_with(&["a", "b"])).unwrap();
        let before = read(dir.path()).unwrap().unwrap();

        // A directory in the way makes the temporary write fail
        fs::create_dir(temp_path(dir.path())).unwrap();
        assert!(generate(dir.path(), &directory_with(&["a"])).is_err());

        assert_eq!(read(dir.path()).unwrap().unwrap(), before);
        assert!(!backup_path(dir.path()).exists());
    }

    #[test]
    fn test_read_missing_list() {
        let dir = TempDir::new().unwrap();
        assert!(read(dir.path()).unwrap().is_none());
    }
}
