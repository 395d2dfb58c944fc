//! File system container layout
//!
//! A file system container packs many resources into one `{name}.dat` file:
//!
//! ```text
//! [0..24]               header: magic "SRFS", version u32,
//!                       index_offset u64, index_length u64
//! [24..index_offset]    data region, files and free blocks
//! [index_offset..]      index: file entries then free blocks
//! ```
//!
//! The index always sits after the data region. Writers place new files in
//! the first free block that fits, or at the end of the data region, and
//! rewrite the index afterwards.

use binrw::{BinRead, BinWrite};
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};
use thiserror::Error;

/// Header magic
pub const FILE_SYSTEM_MAGIC: [u8; 4] = *b"SRFS";

/// Current layout version
pub const FILE_SYSTEM_VERSION: u32 = 1;

/// Header length, also the start of the data region
pub const HEADER_LENGTH: u64 = 24;

/// Longest file name an entry can hold
pub const MAX_NAME_LENGTH: usize = u16::MAX as usize;

/// Container layout errors
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// Header magic mismatch
    #[error("Invalid file system magic: {0:?}")]
    InvalidMagic([u8; 4]),

    /// Layout version not known to this build
    #[error("Unsupported file system version {0}")]
    UnsupportedVersion(u32),

    /// Index does not describe a consistent data region
    #[error("Corrupt file system index: {0}")]
    CorruptIndex(String),

    /// File name is empty or too long
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    /// Binary read/write error
    #[error("Binary parsing error: {0}")]
    BinRead(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<binrw::Error> for FileSystemError {
    fn from(e: binrw::Error) -> Self {
        match e {
            binrw::Error::Io(io) => Self::Io(io),
            other => Self::BinRead(other.to_string()),
        }
    }
}

/// Result type alias for container layout operations
pub type Result<T> = std::result::Result<T, FileSystemError>;

/// Fixed container header
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct FileSystemHeader {
    /// Magic "SRFS"
    pub magic: [u8; 4],
    /// Layout version
    pub version: u32,
    /// Absolute offset of the index
    pub index_offset: u64,
    /// Index length in bytes
    pub index_length: u64,
}

impl FileSystemHeader {
    /// Header of an empty container
    pub const fn empty() -> Self {
        Self {
            magic: FILE_SYSTEM_MAGIC,
            version: FILE_SYSTEM_VERSION,
            index_offset: HEADER_LENGTH,
            index_length: 0,
        }
    }

    fn check(&self) -> Result<()> {
        if self.magic != FILE_SYSTEM_MAGIC {
            return Err(FileSystemError::InvalidMagic(self.magic));
        }
        if self.version != FILE_SYSTEM_VERSION {
            return Err(FileSystemError::UnsupportedVersion(self.version));
        }
        if self.index_offset < HEADER_LENGTH {
            return Err(FileSystemError::CorruptIndex(format!(
                "index offset {} inside header",
                self.index_offset
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
struct FileRecord {
    name_length: u16,
    #[br(count = name_length)]
    name: Vec<u8>,
    offset: u64,
    length: u32,
}

#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
struct FreeRecord {
    offset: u64,
    length: u64,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
struct IndexRecord {
    file_count: u32,
    #[br(count = file_count)]
    files: Vec<FileRecord>,
    free_count: u32,
    #[br(count = free_count)]
    free: Vec<FreeRecord>,
}

/// Location of one file in the data region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute offset
    pub offset: u64,
    /// Length in bytes
    pub length: u32,
}

/// Unused extent of the data region
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FreeBlock {
    /// Absolute offset
    pub offset: u64,
    /// Length in bytes
    pub length: u64,
}

/// In-memory container index
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileSystemIndex {
    files: BTreeMap<String, FileEntry>,
    free: Vec<FreeBlock>,
}

impl FileSystemIndex {
    /// Index of an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Read header and index from a container stream
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let header = FileSystemHeader::read(reader)?;
        header.check()?;

        if header.index_length == 0 {
            return Ok(Self::new());
        }

        reader.seek(SeekFrom::Start(header.index_offset))?;
        let record = IndexRecord::read(reader)?;

        let mut files = BTreeMap::new();
        for file in record.files {
            let name = String::from_utf8(file.name)
                .map_err(|e| FileSystemError::CorruptIndex(format!("file name: {e}")))?;
            let end = file.offset + u64::from(file.length);
            if file.offset < HEADER_LENGTH || end > header.index_offset {
                return Err(FileSystemError::CorruptIndex(format!(
                    "{name} at {}..{end} outside data region",
                    file.offset
                )));
            }
            let entry = FileEntry {
                offset: file.offset,
                length: file.length,
            };
            if files.insert(name.clone(), entry).is_some() {
                return Err(FileSystemError::CorruptIndex(format!("duplicate file {name}")));
            }
        }

        let free = record
            .free
            .into_iter()
            .map(|block| FreeBlock {
                offset: block.offset,
                length: block.length,
            })
            .collect();

        Ok(Self { files, free })
    }

    /// Write the index after the data region and point the header at it
    ///
    /// Returns the total container length; the caller truncates the file to it.
    pub fn write_to<W: Write + Seek>(&self, writer: &mut W) -> Result<u64> {
        let record = IndexRecord {
            file_count: self.files.len() as u32,
            files: self
                .files
                .iter()
                .map(|(name, entry)| FileRecord {
                    name_length: name.len() as u16,
                    name: name.as_bytes().to_vec(),
                    offset: entry.offset,
                    length: entry.length,
                })
                .collect(),
            free_count: self.free.len() as u32,
            free: self
                .free
                .iter()
                .map(|block| FreeRecord {
                    offset: block.offset,
                    length: block.length,
                })
                .collect(),
        };

        let index_offset = self.data_end();
        writer.seek(SeekFrom::Start(index_offset))?;
        record.write(writer)?;
        let end = writer.stream_position()?;

        let header = FileSystemHeader {
            index_offset,
            index_length: end - index_offset,
            ..FileSystemHeader::empty()
        };
        writer.seek(SeekFrom::Start(0))?;
        header.write(writer)?;
        Ok(end)
    }

    /// End of the data region
    pub fn data_end(&self) -> u64 {
        let files = self
            .files
            .values()
            .map(|e| e.offset + u64::from(e.length));
        let free = self.free.iter().map(|b| b.offset + b.length);
        files.chain(free).max().unwrap_or(HEADER_LENGTH)
    }

    /// Entry for `name`
    pub fn get(&self, name: &str) -> Option<FileEntry> {
        self.files.get(name).copied()
    }

    /// Whether `name` is stored
    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Number of stored files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file is stored
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Stored file names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Free blocks, sorted by offset
    pub fn free_blocks(&self) -> &[FreeBlock] {
        &self.free
    }

    /// Reserve space for `name` and record it
    ///
    /// An existing file of the same name is released first. The caller
    /// writes the bytes at the returned entry's offset.
    pub fn allocate(&mut self, name: &str, length: u32) -> Result<FileEntry> {
        if name.is_empty() || name.len() > MAX_NAME_LENGTH {
            return Err(FileSystemError::InvalidName(name.to_string()));
        }
        self.release(name);

        let wanted = u64::from(length);
        let offset = match self.free.iter().position(|b| b.length >= wanted) {
            Some(index) if wanted > 0 => {
                let block = &mut self.free[index];
                let offset = block.offset;
                block.offset += wanted;
                block.length -= wanted;
                if block.length == 0 {
                    self.free.remove(index);
                }
                offset
            }
            _ => self.data_end(),
        };

        let entry = FileEntry { offset, length };
        self.files.insert(name.to_string(), entry);
        Ok(entry)
    }

    /// Forget `name` and return its space to the free list
    pub fn release(&mut self, name: &str) -> Option<FileEntry> {
        let entry = self.files.remove(name)?;
        if entry.length > 0 {
            self.free.push(FreeBlock {
                offset: entry.offset,
                length: u64::from(entry.length),
            });
            self.coalesce();
        }
        Some(entry)
    }

    fn coalesce(&mut self) {
        self.free.sort_unstable();
        let mut merged: Vec<FreeBlock> = Vec::with_capacity(self.free.len());
        for block in self.free.drain(..) {
            match merged.last_mut() {
                Some(last) if last.offset + last.length == block.offset => {
                    last.length += block.length;
                }
                _ => merged.push(block),
            }
        }

        // A free tail is just unused data region
        let file_end = self
            .files
            .values()
            .map(|e| e.offset + u64::from(e.length))
            .max()
            .unwrap_or(HEADER_LENGTH);
        merged.retain(|b| b.offset < file_end);
        self.free = merged;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_allocate_appends() {
        let mut index = FileSystemIndex::new();
        let a = index.allocate("a", 10).unwrap();
        let b = index.allocate("b", 5).unwrap();
        assert_eq!(a.offset, HEADER_LENGTH);
        assert_eq!(b.offset, HEADER_LENGTH + 10);
        assert_eq!(index.data_end(), HEADER_LENGTH + 15);
    }

    #[test]
    fn test_released_space_is_reused() {
        let mut index = FileSystemIndex::new();
        index.allocate("a", 10).unwrap();
        index.allocate("b", 10).unwrap();
        index.release("a").unwrap();
        assert_eq!(index.free_blocks().len(), 1);

        let c = index.allocate("c", 4).unwrap();
        assert_eq!(c.offset, HEADER_LENGTH);
        assert_eq!(index.free_blocks()[0].length, 6);
    }

    #[test]
    fn test_free_tail_is_dropped() {
        let mut index = FileSystemIndex::new();
        index.allocate("a", 10).unwrap();
        index.allocate("b", 10).unwrap();
        index.release("b").unwrap();
        assert!(index.free_blocks().is_empty());
        assert_eq!(index.data_end(), HEADER_LENGTH + 10);

        index.release("a").unwrap();
        assert!(index.is_empty());
        assert_eq!(index.data_end(), HEADER_LENGTH);
    }

    #[test]
    fn test_index_round_trip() {
        let mut index = FileSystemIndex::new();
        index.allocate("ui.dat", 3).unwrap();
        index.allocate("hero.hd.dat", 7).unwrap();
        index.allocate("tail", 2).unwrap();
        index.release("ui.dat");

        let mut cursor = Cursor::new(vec![0u8; index.data_end() as usize]);
        let end = index.write_to(&mut cursor).unwrap();
        assert_eq!(end, cursor.get_ref().len() as u64);

        let parsed = FileSystemIndex::read_from(&mut cursor).unwrap();
        assert_eq!(parsed, index);
        assert_eq!(parsed.names().collect::<Vec<_>>(), vec!["hero.hd.dat", "tail"]);
    }

    #[test]
    fn test_bad_magic() {
        let mut cursor = Cursor::new(vec![0u8; 24]);
        assert!(matches!(
            FileSystemIndex::read_from(&mut cursor),
            Err(FileSystemError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_overwrite_releases_old_entry() {
        let mut index = FileSystemIndex::new();
        index.allocate("a", 10).unwrap();
        index.allocate("b", 1).unwrap();
        let again = index.allocate("a", 4).unwrap();
        assert_eq!(again.offset, HEADER_LENGTH);
        assert_eq!(index.len(), 2);
    }
}
