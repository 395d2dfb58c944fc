//! Zlib compression of served resources and remote manifests

use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};
use std::io::Read;
use thiserror::Error;

/// Maximum allowed decompression size (1 GB)
///
/// One resource or manifest never comes close; larger outputs are treated
/// as a corrupt or hostile stream.
pub const MAX_DECOMPRESSION_SIZE: usize = 1024 * 1024 * 1024;

/// Compression errors
#[derive(Debug, Error)]
pub enum CompressionError {
    /// Zlib stream could not be encoded
    #[error("Zlib compression failed: {0}")]
    Compress(std::io::Error),

    /// Zlib stream could not be decoded
    #[error("Zlib decompression failed: {0}")]
    Decompress(std::io::Error),

    /// Output grew past [`MAX_DECOMPRESSION_SIZE`]
    #[error("Decompressed size exceeds limit of {MAX_DECOMPRESSION_SIZE} bytes")]
    TooLarge,
}

/// Compress `data` with default zlib settings
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let mut encoder = ZlibEncoder::new(data, Compression::default());
    let mut compressed = Vec::new();
    encoder
        .read_to_end(&mut compressed)
        .map_err(CompressionError::Compress)?;
    Ok(compressed)
}

/// Decompress a zlib stream into a new buffer
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let mut output = Vec::new();
    decompress_into(data, &mut output)?;
    Ok(output)
}

fn decompress_into(data: &[u8], output: &mut Vec<u8>) -> Result<(), CompressionError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = decoder
            .read(&mut buffer)
            .map_err(CompressionError::Decompress)?;
        if bytes_read == 0 {
            return Ok(());
        }
        if output.len() + bytes_read > MAX_DECOMPRESSION_SIZE {
            return Err(CompressionError::TooLarge);
        }
        output.extend_from_slice(&buffer[..bytes_read]);
    }
}

/// Reusable decompression buffer
///
/// The buffer is cleared before and after every use, so the output of one
/// call is never visible to the next.
#[derive(Debug, Default)]
pub struct ScratchBuffer {
    buffer: Vec<u8>,
}

impl ScratchBuffer {
    /// Empty scratch buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Decompress `data` and hand the output to `f`
    pub fn with_decompressed<T>(
        &mut self,
        data: &[u8],
        f: impl FnOnce(&[u8]) -> T,
    ) -> Result<T, CompressionError> {
        self.buffer.clear();
        let result = decompress_into(data, &mut self.buffer).map(|()| f(&self.buffer));
        self.buffer.clear();
        result
    }

    /// Bytes currently held, always zero between calls
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_round_trip() {
        let data = b"resource payload ".repeat(64);
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_garbage_fails() {
        assert!(matches!(
            decompress(b"not zlib at all"),
            Err(CompressionError::Decompress(_))
        ));
    }

    #[test]
    fn test_scratch_buffer_is_reset() {
        let mut scratch = ScratchBuffer::new();
        let long = compress(&[7u8; 4096]).unwrap();
        let short = compress(b"abc").unwrap();

        let len = scratch.with_decompressed(&long, <[u8]>::len).unwrap();
        assert_eq!(len, 4096);
        assert!(scratch.is_empty());

        let copy = scratch.with_decompressed(&short, <[u8]>::to_vec).unwrap();
        assert_eq!(copy, b"abc");

        assert!(scratch.with_decompressed(b"junk", |_| ()).is_err());
        assert_eq!(scratch.len(), 0);
    }
}
