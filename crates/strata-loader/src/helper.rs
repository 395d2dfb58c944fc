//! Seams to the engine's container codec
//!
//! The loader never interprets container bytes itself. Each load agent owns
//! a [`LoadAgentHelper`] it drives through read, parse and extract stages;
//! the helper reports completion through [`LoadAgentHelper::poll`] on a later
//! tick. The [`ResourceHelper`] creates those agent helpers and releases
//! whatever the engine allocated once the pools let go of an object.

use crate::error::LoadStatus;
use std::path::PathBuf;
use strata_client_storage::ResourceInfo;
use strata_crypto::HashKey;
use strata_crypto::xor::QUICK_ENCRYPT_LENGTH;
use strata_formats::Encryption;

/// Pipeline stage a progress report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStage {
    /// Reading the container from disk
    ReadResource,
    /// Turning bytes into a container
    ParseResource,
    /// Extracting the asset from the container
    LoadAsset,
    /// Activating a scene from the container
    LoadScene,
}

/// Where the bytes of a resource live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadSource {
    /// Loose file
    File(PathBuf),
    /// Byte range inside a file system container
    FileSystem {
        /// Container path
        path: PathBuf,
        /// Entry name inside the container
        entry: String,
        /// Absolute offset of the entry
        offset: u64,
        /// Entry length
        length: u32,
    },
}

/// Completion reported by an agent helper
#[derive(Debug)]
pub enum HelperEvent<C, A> {
    /// Progress of the current stage, from 0.0 to 1.0
    Progress {
        /// Stage reporting
        stage: LoadStage,
        /// Fraction done
        progress: f32,
    },
    /// [`LoadAgentHelper::read_file`] opened the container
    ReadFileComplete(C),
    /// [`LoadAgentHelper::read_bytes`] finished
    ReadBytesComplete(Vec<u8>),
    /// [`LoadAgentHelper::parse_bytes`] produced the container
    ParseBytesComplete(C),
    /// [`LoadAgentHelper::load_asset`] extracted the asset
    LoadAssetComplete(A),
    /// [`LoadAgentHelper::load_scene`] activated the scene
    LoadSceneComplete,
    /// The current stage failed
    Error {
        /// Reason
        status: LoadStatus,
        /// Details
        message: String,
    },
}

/// Per-agent container codec
pub trait LoadAgentHelper<C, A> {
    /// Open a container directly from its file
    fn read_file(&mut self, source: &ReadSource) -> Result<(), String>;

    /// Read the raw bytes of a resource
    fn read_bytes(&mut self, source: &ReadSource) -> Result<(), String>;

    /// Parse decrypted bytes into a container
    fn parse_bytes(&mut self, bytes: Vec<u8>) -> Result<(), String>;

    /// Extract `asset_name` from `container`
    fn load_asset(&mut self, container: &C, asset_name: &str) -> Result<(), String>;

    /// Activate the scene `scene_asset_name` stored in `container`
    fn load_scene(&mut self, container: &C, scene_asset_name: &str) -> Result<(), String>;

    /// Next completion, if any
    fn poll(&mut self) -> Option<HelperEvent<C, A>>;

    /// Abandon the current operation
    fn reset(&mut self);
}

/// Engine side of the loader
pub trait ResourceHelper<C, A> {
    /// New helper for one load agent
    fn create_agent_helper(&mut self) -> Box<dyn LoadAgentHelper<C, A>>;

    /// Free engine state of a container the resource pool released
    fn release_container(&mut self, container: &C);

    /// Free engine state of an asset the asset pool released
    fn release_asset(&mut self, asset: &A);

    /// Deactivate a scene
    fn unload_scene(&mut self, scene_asset_name: &str) -> Result<(), String>;
}

/// Turns stored resource bytes back into plain bytes
pub trait Decryptor {
    /// Decrypt `data`, the bytes of `resource` starting at `offset`
    fn decrypt(&self, resource: &ResourceInfo, data: &mut [u8], offset: u64);
}

/// XOR by the resource's own hash bytes, as the load type requests
#[derive(Debug, Clone, Copy, Default)]
pub struct HashXorDecryptor;

impl Decryptor for HashXorDecryptor {
    fn decrypt(&self, resource: &ResourceInfo, data: &mut [u8], offset: u64) {
        let limit = match resource.load_type().encryption() {
            Encryption::None => return,
            Encryption::Quick => QUICK_ENCRYPT_LENGTH as u64,
            Encryption::Full => u64::MAX,
        };
        let key = HashKey::from(resource.hash());
        let key = key.as_bytes();
        for (position, byte) in (offset..limit).zip(data.iter_mut()) {
            *byte ^= key[(position % key.len() as u64) as usize];
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use strata_crypto::ResourceHash;
    use strata_formats::{LoadType, ResourceName};

    fn resource(load_type: LoadType, hash: ResourceHash) -> ResourceInfo {
        ResourceInfo::new(
            ResourceName::simple("blob"),
            None,
            load_type,
            0,
            hash,
            0,
            true,
            true,
        )
    }

    #[test]
    fn test_whole_buffer_matches_load_type_transform() {
        let plain: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
        let hash = ResourceHash::of(&plain);
        for load_type in [
            LoadType::LoadFromBinaryAndQuickDecrypt,
            LoadType::LoadFromBinaryAndDecrypt,
        ] {
            let mut stored = plain.clone();
            load_type.decrypt(&mut stored, hash);

            HashXorDecryptor.decrypt(&resource(load_type, hash), &mut stored, 0);
            assert_eq!(stored, plain, "{load_type:?}");
        }
    }

    #[test]
    fn test_segment_decrypts_at_its_offset() {
        let plain: Vec<u8> = (0..600u32).map(|i| (i * 3 % 256) as u8).collect();
        let hash = ResourceHash::of(&plain);
        for load_type in [
            LoadType::LoadFromBinaryAndQuickDecrypt,
            LoadType::LoadFromBinaryAndDecrypt,
        ] {
            let mut stored = plain.clone();
            load_type.decrypt(&mut stored, hash);

            // Straddles the end of the quick range
            let mut segment = stored[201..315].to_vec();
            HashXorDecryptor.decrypt(&resource(load_type, hash), &mut segment, 201);
            assert_eq!(segment, plain[201..315], "{load_type:?}");
        }
    }

    #[test]
    fn test_plain_load_type_is_untouched() {
        let mut data = vec![1, 2, 3];
        HashXorDecryptor.decrypt(
            &resource(LoadType::LoadFromBinary, ResourceHash::new(0xdead_beef)),
            &mut data,
            0,
        );
        assert_eq!(data, vec![1, 2, 3]);
    }
}
