//! Primitive encodings shared by all version list kinds
//!
//! - 7-bit variable-length integers (low group first, high bit = continue)
//! - One-byte-length strings XORed with the per-file string key
//! - Fixed-width little-endian integers for schema version 0

use crate::version_list::error::{Result, VersionListError};
use binrw::{BinRead, BinResult, BinWrite, Endian};
use std::io::{Cursor, Read, Seek, Write};
use strata_crypto::ResourceHash;

/// Length of the per-file string key
pub const STRING_KEY_LENGTH: usize = 4;

/// 7-bit variable-length `u32`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarU32(pub u32);

impl BinRead for VarU32 {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let mut value: u32 = 0;
        let mut shift = 0u32;
        loop {
            let mut byte = [0u8; 1];
            reader.read_exact(&mut byte)?;
            if shift == 28 && byte[0] & 0xF0 != 0 {
                return Err(binrw::Error::Custom {
                    pos: reader.stream_position().unwrap_or(0),
                    err: Box::new(VersionListError::VarIntOverflow),
                });
            }
            value |= u32::from(byte[0] & 0x7F) << shift;
            if byte[0] & 0x80 == 0 {
                return Ok(Self(value));
            }
            shift += 7;
        }
    }
}

impl BinWrite for VarU32 {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        let mut value = self.0;
        while value >= 0x80 {
            writer.write_all(&[(value as u8) | 0x80])?;
            value >>= 7;
        }
        writer.write_all(&[value as u8])?;
        Ok(())
    }
}

/// 7-bit variable-length `u64`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarU64(pub u64);

impl BinRead for VarU64 {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let mut byte = [0u8; 1];
            reader.read_exact(&mut byte)?;
            if shift == 63 && byte[0] & 0xFE != 0 {
                return Err(binrw::Error::Custom {
                    pos: reader.stream_position().unwrap_or(0),
                    err: Box::new(VersionListError::VarIntOverflow),
                });
            }
            value |= u64::from(byte[0] & 0x7F) << shift;
            if byte[0] & 0x80 == 0 {
                return Ok(Self(value));
            }
            shift += 7;
        }
    }
}

impl BinWrite for VarU64 {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        let mut value = self.0;
        while value >= 0x80 {
            writer.write_all(&[(value as u8) | 0x80])?;
            value >>= 7;
        }
        writer.write_all(&[value as u8])?;
        Ok(())
    }
}

/// String stored as `len:u8` followed by `len` bytes XORed with the string key
///
/// A zero length stands for an absent string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedString(pub Option<String>);

impl BinRead for EncryptedString {
    type Args<'a> = &'a [u8; STRING_KEY_LENGTH];

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _endian: Endian,
        key: Self::Args<'_>,
    ) -> BinResult<Self> {
        let mut length = [0u8; 1];
        reader.read_exact(&mut length)?;
        if length[0] == 0 {
            return Ok(Self(None));
        }

        let mut bytes = vec![0u8; length[0] as usize];
        reader.read_exact(&mut bytes)?;
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte ^= key[i % STRING_KEY_LENGTH];
        }

        String::from_utf8(bytes)
            .map(|s| Self(Some(s)))
            .map_err(|_| binrw::Error::Custom {
                pos: reader.stream_position().unwrap_or(0),
                err: Box::new(VersionListError::InvalidUtf8),
            })
    }
}

impl BinWrite for EncryptedString {
    type Args<'a> = &'a [u8; STRING_KEY_LENGTH];

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _endian: Endian,
        key: Self::Args<'_>,
    ) -> BinResult<()> {
        let Some(value) = self.0.as_deref().filter(|v| !v.is_empty()) else {
            writer.write_all(&[0])?;
            return Ok(());
        };

        if value.len() > usize::from(u8::MAX) {
            return Err(binrw::Error::Custom {
                pos: writer.stream_position().unwrap_or(0),
                err: Box::new(VersionListError::StringTooLong(value.len())),
            });
        }

        let mut bytes = value.as_bytes().to_vec();
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte ^= key[i % STRING_KEY_LENGTH];
        }
        writer.write_all(&[bytes.len() as u8])?;
        writer.write_all(&bytes)?;
        Ok(())
    }
}

/// Integer width used by a schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntEncoding {
    /// Little-endian fixed width (schema version 0)
    Fixed,
    /// 7-bit variable length (schema version 1 and later)
    Variable,
}

impl IntEncoding {
    /// Encoding used by manifest schema `version`
    pub const fn for_version(version: u8) -> Self {
        if version == 0 {
            Self::Fixed
        } else {
            Self::Variable
        }
    }
}

/// Reader over a list body, after the header
pub(crate) struct ListReader<'a> {
    cursor: Cursor<&'a [u8]>,
    key: [u8; STRING_KEY_LENGTH],
    encoding: IntEncoding,
}

impl<'a> ListReader<'a> {
    /// Start reading `body`; the first four bytes are the string key
    pub(crate) fn new(body: &'a [u8], encoding: IntEncoding) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let key = <[u8; STRING_KEY_LENGTH]>::read_options(&mut cursor, Endian::Little, ())?;
        Ok(Self {
            cursor,
            key,
            encoding,
        })
    }

    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(u8::read_options(&mut self.cursor, Endian::Little, ())?)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        match self.encoding {
            IntEncoding::Fixed => Ok(u32::read_options(&mut self.cursor, Endian::Little, ())?),
            IntEncoding::Variable => Ok(VarU32::read_options(&mut self.cursor, Endian::Little, ())?.0),
        }
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        match self.encoding {
            IntEncoding::Fixed => Ok(u64::read_options(&mut self.cursor, Endian::Little, ())?),
            IntEncoding::Variable => Ok(VarU64::read_options(&mut self.cursor, Endian::Little, ())?.0),
        }
    }

    /// Fixed-width `u64` regardless of schema
    pub(crate) fn read_fixed_u64(&mut self) -> Result<u64> {
        Ok(u64::read_options(&mut self.cursor, Endian::Little, ())?)
    }

    /// Hashes are always four fixed bytes
    pub(crate) fn read_hash(&mut self) -> Result<ResourceHash> {
        Ok(ResourceHash::new(u32::read_options(
            &mut self.cursor,
            Endian::Little,
            (),
        )?))
    }

    pub(crate) fn read_opt_string(&mut self) -> Result<Option<String>> {
        Ok(EncryptedString::read_options(&mut self.cursor, Endian::Little, &self.key)?.0)
    }

    pub(crate) fn read_string(&mut self, what: &'static str) -> Result<String> {
        self.read_opt_string()?
            .ok_or(VersionListError::EmptyName(what))
    }

    /// Element count, with capacity bounded by what the data could hold
    pub(crate) fn read_count(&mut self) -> Result<(usize, usize)> {
        let count = self.read_u32()? as usize;
        Ok((count, count.min(self.remaining())))
    }

    pub(crate) fn read_indexes(&mut self) -> Result<Vec<u32>> {
        let (count, capacity) = self.read_count()?;
        let mut indexes = Vec::with_capacity(capacity);
        for _ in 0..count {
            indexes.push(self.read_u32()?);
        }
        Ok(indexes)
    }

    /// Fail if bytes remain after the structure
    pub(crate) fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(VersionListError::TrailingData(extra)),
        }
    }

    /// Stop without checking for trailing bytes and report the consumed length
    pub(crate) fn position(&self) -> u64 {
        self.cursor.position()
    }
}

/// Writer for a list body, after the header
pub(crate) struct ListWriter {
    cursor: Cursor<Vec<u8>>,
    key: [u8; STRING_KEY_LENGTH],
    encoding: IntEncoding,
}

impl ListWriter {
    /// Start a body with `key` written first
    pub(crate) fn new(prefix: Vec<u8>, key: [u8; STRING_KEY_LENGTH], encoding: IntEncoding) -> Result<Self> {
        let mut cursor = Cursor::new(prefix);
        cursor.set_position(cursor.get_ref().len() as u64);
        key.write_options(&mut cursor, Endian::Little, ())?;
        Ok(Self {
            cursor,
            key,
            encoding,
        })
    }

    pub(crate) fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(value.write_options(&mut self.cursor, Endian::Little, ())?)
    }

    pub(crate) fn write_u32(&mut self, value: u32) -> Result<()> {
        match self.encoding {
            IntEncoding::Fixed => Ok(value.write_options(&mut self.cursor, Endian::Little, ())?),
            IntEncoding::Variable => Ok(VarU32(value).write_options(&mut self.cursor, Endian::Little, ())?),
        }
    }

    pub(crate) fn write_u64(&mut self, value: u64) -> Result<()> {
        match self.encoding {
            IntEncoding::Fixed => Ok(value.write_options(&mut self.cursor, Endian::Little, ())?),
            IntEncoding::Variable => Ok(VarU64(value).write_options(&mut self.cursor, Endian::Little, ())?),
        }
    }

    pub(crate) fn write_fixed_u64(&mut self, value: u64) -> Result<()> {
        Ok(value.write_options(&mut self.cursor, Endian::Little, ())?)
    }

    pub(crate) fn write_hash(&mut self, hash: ResourceHash) -> Result<()> {
        Ok(hash.value().write_options(&mut self.cursor, Endian::Little, ())?)
    }

    pub(crate) fn write_opt_string(&mut self, value: Option<&str>) -> Result<()> {
        Ok(EncryptedString(value.map(str::to_string)).write_options(
            &mut self.cursor,
            Endian::Little,
            &self.key,
        )?)
    }

    pub(crate) fn write_string(&mut self, value: &str, what: &'static str) -> Result<()> {
        if value.is_empty() {
            return Err(VersionListError::EmptyName(what));
        }
        self.write_opt_string(Some(value))
    }

    pub(crate) fn write_count(&mut self, count: usize) -> Result<()> {
        self.write_u32(count as u32)
    }

    pub(crate) fn write_indexes(&mut self, indexes: &[u32]) -> Result<()> {
        self.write_count(indexes.len())?;
        for &index in indexes {
            self.write_u32(index)?;
        }
        Ok(())
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

/// Fresh random string key for a new serialization
pub(crate) fn random_key() -> [u8; STRING_KEY_LENGTH] {
    rand::random()
}

/// Check every index in `indexes` against a table length
pub(crate) fn check_indexes(indexes: &[u32], table: &'static str, len: usize) -> Result<()> {
    match indexes.iter().find(|&&i| i as usize >= len) {
        Some(&index) => Err(VersionListError::IndexOutOfRange { table, index, len }),
        None => Ok(()),
    }
}
