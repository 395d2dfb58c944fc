//! File system container store
//!
//! A [`FileSystemStore`] is one open `{name}.dat` container. The
//! [`FileSystemManager`] keeps containers open by absolute path so the
//! checker, updater and loader share one handle per file.

use crate::{DEFAULT_EXTENSION, Result, StorageError};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use strata_formats::filesystem::{FileEntry, FileSystemIndex};
use tracing::{debug, info};

/// Path of the container `name` under `root`
pub fn file_system_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{name}.{DEFAULT_EXTENSION}"))
}

/// One open file system container
#[derive(Debug)]
pub struct FileSystemStore {
    path: PathBuf,
    file: File,
    index: FileSystemIndex,
    writable: bool,
}

impl FileSystemStore {
    /// Create an empty container, replacing any existing file
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let index = FileSystemIndex::new();
        let end = index.write_to(&mut file)?;
        file.set_len(end)?;

        info!("Created file system {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
            index,
            writable: true,
        })
    }

    /// Open an existing container
    pub fn load(path: &Path, writable: bool) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(writable).open(path)?;
        let index = FileSystemIndex::read_from(&mut file)?;
        debug!(
            "Loaded file system {} with {} files",
            path.display(),
            index.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            index,
            writable,
        })
    }

    /// Container path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether writes are allowed
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Number of stored files
    pub fn file_count(&self) -> usize {
        self.index.len()
    }

    /// Whether no file is stored
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether `name` is stored
    pub fn has_file(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// Location of `name`
    pub fn file_info(&self, name: &str) -> Option<FileEntry> {
        self.index.get(name)
    }

    /// Stored file names in order
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.index.names()
    }

    fn require_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(StorageError::InvalidState(format!(
                "file system {} is read-only",
                self.path.display()
            )))
        }
    }

    fn commit_index(&mut self) -> Result<()> {
        let end = self.index.write_to(&mut self.file)?;
        self.file.set_len(end)?;
        self.file.flush()?;
        Ok(())
    }

    /// Store `data` as `name`, replacing an existing file
    pub fn write_file(&mut self, name: &str, data: &[u8]) -> Result<bool> {
        self.require_writable()?;
        let length = u32::try_from(data.len()).map_err(|_| {
            StorageError::InvalidState(format!("{name} is too large for a file system"))
        })?;

        let entry = self.index.allocate(name, length)?;
        self.file.seek(SeekFrom::Start(entry.offset))?;
        self.file.write_all(data)?;
        self.commit_index()?;
        Ok(true)
    }

    /// Store the contents of the file at `source` as `name`
    pub fn write_file_from_path(&mut self, name: &str, source: &Path) -> Result<bool> {
        self.require_writable()?;
        let mut input = match File::open(source) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let length = u32::try_from(input.metadata()?.len()).map_err(|_| {
            StorageError::InvalidState(format!("{} is too large for a file system", source.display()))
        })?;

        let entry = self.index.allocate(name, length)?;
        self.file.seek(SeekFrom::Start(entry.offset))?;
        let copied = io::copy(&mut (&mut input).take(u64::from(length)), &mut self.file)?;
        if copied != u64::from(length) {
            self.index.release(name);
            self.commit_index()?;
            return Err(StorageError::Verification(format!(
                "{} shrank while copying into {}",
                source.display(),
                self.path.display()
            )));
        }
        self.commit_index()?;
        Ok(true)
    }

    /// Whole contents of `name`
    pub fn read_file(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self.index.get(name) else {
            return Ok(None);
        };
        self.read_range(entry.offset, entry.length as usize).map(Some)
    }

    /// `length` bytes of `name` starting at `offset`, clamped to the file
    pub fn read_file_segment(
        &mut self,
        name: &str,
        offset: u32,
        length: u32,
    ) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self.index.get(name) else {
            return Ok(None);
        };
        let start = offset.min(entry.length);
        let length = length.min(entry.length - start);
        self.read_range(entry.offset + u64::from(start), length as usize)
            .map(Some)
    }

    fn read_range(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; length];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Remove `name`; false when it was not stored
    pub fn delete_file(&mut self, name: &str) -> Result<bool> {
        self.require_writable()?;
        if self.index.release(name).is_none() {
            return Ok(false);
        }
        self.commit_index()?;
        Ok(true)
    }

    /// Copy `name` out to a loose file at `destination`
    pub fn save_as_file(&mut self, name: &str, destination: &Path) -> Result<bool> {
        let Some(data) = self.read_file(name)? else {
            return Ok(false);
        };
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(destination, data)?;
        Ok(true)
    }
}

/// Open file system containers keyed by path
#[derive(Debug, Default)]
pub struct FileSystemManager {
    stores: HashMap<PathBuf, FileSystemStore>,
}

impl FileSystemManager {
    /// Manager with no open containers
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty container at `path` and keep it open
    pub fn create_file_system(&mut self, path: &Path) -> Result<&mut FileSystemStore> {
        let store = FileSystemStore::create(path)?;
        self.stores.insert(path.to_path_buf(), store);
        self.stores
            .get_mut(path)
            .ok_or_else(|| StorageError::Invariant("created file system vanished".to_string()))
    }

    /// Open the container at `path`, reusing an already open handle
    pub fn load_file_system(&mut self, path: &Path, writable: bool) -> Result<&mut FileSystemStore> {
        let reopen = self
            .stores
            .get(path)
            .is_none_or(|store| writable && !store.is_writable());
        if reopen {
            let store = FileSystemStore::load(path, writable)?;
            self.stores.insert(path.to_path_buf(), store);
        }
        self.stores
            .get_mut(path)
            .ok_or_else(|| StorageError::Invariant("loaded file system vanished".to_string()))
    }

    /// Open the writable container at `path`, creating it when absent
    pub fn open_or_create(&mut self, path: &Path) -> Result<&mut FileSystemStore> {
        if path.exists() || self.stores.contains_key(path) {
            self.load_file_system(path, true)
        } else {
            self.create_file_system(path)
        }
    }

    /// Open handle for `path`, if any
    pub fn file_system(&mut self, path: &Path) -> Option<&mut FileSystemStore> {
        self.stores.get_mut(path)
    }

    /// Close the container at `path`, deleting the file when `delete_file` is set
    pub fn destroy_file_system(&mut self, path: &Path, delete_file: bool) -> Result<bool> {
        let existed = self.stores.remove(path).is_some();
        if delete_file && path.exists() {
            fs::remove_file(path)?;
            info!("Destroyed file system {}", path.display());
            return Ok(true);
        }
        Ok(existed)
    }

    /// Paths of open containers
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.stores.keys().map(PathBuf::as_path)
    }

    /// Close every container
    pub fn clear(&mut self) {
        self.stores.clear();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_delete() {
        let dir = TempDir::new().unwrap();
        let path = file_system_path(dir.path(), "core");
        let mut store = FileSystemStore::create(&path).unwrap();

        assert!(store.write_file("a.dat", b"alpha").unwrap());
        assert!(store.write_file("b.dat", b"bravo!").unwrap());
        assert_eq!(store.read_file("a.dat").unwrap().unwrap(), b"alpha");
        assert_eq!(
            store.read_file_segment("b.dat", 2, 10).unwrap().unwrap(),
            b"avo!"
        );

        assert!(store.delete_file("a.dat").unwrap());
        assert!(!store.delete_file("a.dat").unwrap());
        assert!(store.read_file("a.dat").unwrap().is_none());
        assert_eq!(store.file_count(), 1);

        drop(store);
        let mut reopened = FileSystemStore::load(&path, false).unwrap();
        assert_eq!(reopened.read_file("b.dat").unwrap().unwrap(), b"bravo!");
        assert!(reopened.write_file("c.dat", b"x").is_err());
    }

    #[test]
    fn test_write_from_path_and_save_as() {
        let dir = TempDir::new().unwrap();
        let loose = dir.path().join("loose.dat");
        fs::write(&loose, b"loose bytes").unwrap();

        let mut store = FileSystemStore::create(&file_system_path(dir.path(), "fs")).unwrap();
        assert!(store.write_file_from_path("loose.dat", &loose).unwrap());
        assert!(!store
            .write_file_from_path("missing.dat", &dir.path().join("missing"))
            .unwrap());

        let out = dir.path().join("out/loose.dat");
        assert!(store.save_as_file("loose.dat", &out).unwrap());
        assert_eq!(fs::read(out).unwrap(), b"loose bytes");
        assert!(!store.save_as_file("nope", &dir.path().join("nope")).unwrap());
    }

    #[test]
    fn test_container_shrinks_after_delete() {
        let dir = TempDir::new().unwrap();
        let path = file_system_path(dir.path(), "fs");
        let mut store = FileSystemStore::create(&path).unwrap();
        store.write_file("big", &[1u8; 4096]).unwrap();
        let full = fs::metadata(&path).unwrap().len();
        store.delete_file("big").unwrap();
        assert!(fs::metadata(&path).unwrap().len() < full);
        assert!(store.is_empty());
    }

    #[test]
    fn test_manager_lifecycle() {
        let dir = TempDir::new().unwrap();
        let path = file_system_path(dir.path(), "shared");
        let mut manager = FileSystemManager::new();

        manager.open_or_create(&path).unwrap().write_file("x", b"1").unwrap();
        assert!(path.exists());
        assert_eq!(manager.paths().count(), 1);

        manager.clear();
        let store = manager.open_or_create(&path).unwrap();
        assert!(store.has_file("x"));

        assert!(manager.destroy_file_system(&path, true).unwrap());
        assert!(!path.exists());
        assert!(manager.file_system(&path).is_none());
    }
}
