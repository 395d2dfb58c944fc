//! Remote manifest bootstrap
//!
//! The host learns the current manifest from a small [`VersionPointer`]
//! served out of band. [`VersionListProcessor::check_version_list`] tells
//! whether the manifest it names is already on disk; otherwise
//! [`VersionListProcessor::update_version_list`] downloads it as a zlib
//! stream, verifies both the compressed and the plain bytes, and renames it
//! into `ResourceVersion.<crc>.dat`. Failures are reported once and never
//! retried here.

use crate::directory::ResourceStorage;
use crate::events::{EventSink, StorageEvent};
use crate::transport::{DownloadId, DownloadTag, Transport, TransportEvent};
use crate::{DEFAULT_EXTENSION, REMOTE_VERSION_LIST_FILE_NAME, Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strata_crypto::ResourceHash;
use strata_formats::compression;
use strata_formats::version_list::UpdatableVersionList;
use tracing::{debug, info, warn};

/// Out-of-band description of the current remote manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionPointer {
    /// Client version the manifest applies to
    pub applicable_version: String,
    /// Manifest revision
    pub internal_version: u32,
    /// Plain manifest length
    pub version_list_length: u32,
    /// CRC-32 of the plain manifest
    pub version_list_hash_code: u32,
    /// Served manifest length
    pub version_list_compressed_length: u32,
    /// CRC-32 of the served manifest
    pub version_list_compressed_hash_code: u32,
    /// Base URI for this manifest and its resources, if it overrides the host's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_prefix_uri: Option<String>,
}

impl VersionPointer {
    /// Parse a pointer from JSON
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Plain manifest hash
    pub fn hash(&self) -> ResourceHash {
        ResourceHash::new(self.version_list_hash_code)
    }

    /// Served manifest hash
    pub fn compressed_hash(&self) -> ResourceHash {
        ResourceHash::new(self.version_list_compressed_hash_code)
    }

    /// `ResourceVersion.<crc>.dat`
    pub fn file_name(&self) -> String {
        format!(
            "{}.{}.{}",
            REMOTE_VERSION_LIST_FILE_NAME,
            self.hash().to_hex(),
            DEFAULT_EXTENSION
        )
    }
}

/// Whether the pointer's manifest is already in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckVersionListResult {
    /// On disk with the expected internal version
    Updated,
    /// Must be downloaded
    NeedUpdate,
}

#[derive(Debug)]
struct PendingVersionList {
    id: DownloadId,
    pointer: VersionPointer,
    uri: String,
    download_path: PathBuf,
    final_path: PathBuf,
}

/// Fetches and verifies the remote manifest
#[derive(Debug)]
pub struct VersionListProcessor {
    events: EventSink,
    pending: Option<PendingVersionList>,
    version_list_path: Option<PathBuf>,
}

impl VersionListProcessor {
    /// Processor reporting through `events`
    pub fn new(events: EventSink) -> Self {
        Self {
            events,
            pending: None,
            version_list_path: None,
        }
    }

    /// Path of the verified manifest, once known
    pub fn version_list_path(&self) -> Option<&Path> {
        self.version_list_path.as_deref()
    }

    /// Whether a manifest download is in flight
    pub fn is_updating(&self) -> bool {
        self.pending.is_some()
    }

    /// Compare the manifest on disk with `pointer`
    pub fn check_version_list(
        &mut self,
        storage: &ResourceStorage,
        pointer: &VersionPointer,
    ) -> Result<CheckVersionListResult> {
        let path = storage.config.read_write_dir()?.join(pointer.file_name());
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No manifest at {}", path.display());
                return Ok(CheckVersionListResult::NeedUpdate);
            }
            Err(e) => return Err(e.into()),
        };

        match UpdatableVersionList::peek_internal_version(&data) {
            Ok(version) if version == pointer.internal_version => {
                info!("Manifest {} is current", path.display());
                self.version_list_path = Some(path);
                Ok(CheckVersionListResult::Updated)
            }
            Ok(version) => {
                debug!(
                    "Manifest {} has internal version {}, expected {}",
                    path.display(),
                    version,
                    pointer.internal_version
                );
                Ok(CheckVersionListResult::NeedUpdate)
            }
            Err(e) => {
                warn!("Unreadable manifest {}: {}", path.display(), e);
                Ok(CheckVersionListResult::NeedUpdate)
            }
        }
    }

    /// Start downloading the manifest named by `pointer`
    pub fn update_version_list(
        &mut self,
        storage: &ResourceStorage,
        transport: &mut dyn Transport,
        pointer: &VersionPointer,
    ) -> Result<()> {
        if self.pending.is_some() {
            return Err(StorageError::InvalidState(
                "manifest download already in progress".to_string(),
            ));
        }
        let read_write = storage.config.read_write_dir()?;
        let prefix = match pointer.update_prefix_uri.as_deref() {
            Some(prefix) if !prefix.is_empty() => prefix.trim_end_matches('/'),
            _ => storage.config.update_prefix()?,
        };

        let file_name = pointer.file_name();
        let final_path = read_write.join(&file_name);
        let download_path = read_write.join(format!("{file_name}.zip"));
        let uri = format!("{prefix}/{file_name}");
        fs::create_dir_all(read_write)?;
        if download_path.exists() {
            fs::remove_file(&download_path)?;
        }

        let id = transport.add_download(&download_path, &uri, DownloadTag::VersionList(pointer.hash()))?;
        info!("Downloading manifest {}", uri);
        self.pending = Some(PendingVersionList {
            id,
            pointer: pointer.clone(),
            uri,
            download_path,
            final_path,
        });
        Ok(())
    }

    /// Handle a transport event tagged for the manifest
    pub fn on_transport_event(&mut self, transport: &mut dyn Transport, event: TransportEvent) {
        let Some(pending) = self.pending.as_ref() else {
            return;
        };
        if event.id() != pending.id {
            return;
        }
        let compressed_length = u64::from(pending.pointer.version_list_compressed_length);

        match event {
            TransportEvent::Start { current_length, .. } | TransportEvent::Update { current_length, .. } => {
                if current_length > compressed_length {
                    transport.remove_download(pending.id);
                    let message = format!("received {current_length} bytes, expected {compressed_length}");
                    self.fail(&message);
                }
            }
            TransportEvent::Success { .. } => {
                let Some(pending) = self.pending.take() else {
                    return;
                };
                match verify_and_install(&pending) {
                    Ok(()) => {
                        info!("Manifest {} is in place", pending.final_path.display());
                        self.version_list_path = Some(pending.final_path.clone());
                        self.events.emit(StorageEvent::VersionListUpdateSuccess {
                            path: pending.final_path,
                            uri: pending.uri,
                        });
                    }
                    Err(e) => {
                        self.pending = Some(pending);
                        self.fail(&e.to_string());
                    }
                }
            }
            TransportEvent::Failure { message, .. } => self.fail(&message),
        }
    }

    fn fail(&mut self, message: &str) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if let Err(e) = fs::remove_file(&pending.download_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to delete {}: {}", pending.download_path.display(), e);
        }
        warn!("Manifest update from {} failed: {}", pending.uri, message);
        self.events.emit(StorageEvent::VersionListUpdateFailure {
            uri: pending.uri,
            message: message.to_string(),
        });
    }
}

fn verify_and_install(pending: &PendingVersionList) -> Result<()> {
    let pointer = &pending.pointer;
    let compressed = fs::read(&pending.download_path)?;
    if compressed.len() != pointer.version_list_compressed_length as usize {
        return Err(StorageError::Verification(format!(
            "manifest compressed length {} != expected {}",
            compressed.len(),
            pointer.version_list_compressed_length
        )));
    }
    let compressed_hash = ResourceHash::of(&compressed);
    if compressed_hash != pointer.compressed_hash() {
        return Err(StorageError::Verification(format!(
            "manifest compressed hash {compressed_hash} != expected {}",
            pointer.compressed_hash()
        )));
    }

    let plain = compression::decompress(&compressed)?;
    if plain.len() != pointer.version_list_length as usize {
        return Err(StorageError::Verification(format!(
            "manifest length {} != expected {}",
            plain.len(),
            pointer.version_list_length
        )));
    }
    let hash = ResourceHash::of(&plain);
    if hash != pointer.hash() {
        return Err(StorageError::Verification(format!(
            "manifest hash {hash} != expected {}",
            pointer.hash()
        )));
    }

    let temporary = pending.final_path.with_extension("tmp");
    fs::write(&temporary, &plain)?;
    fs::rename(&temporary, &pending.final_path)?;
    fs::remove_file(&pending.download_path)?;
    Ok(())
}
