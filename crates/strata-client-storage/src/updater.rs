//! Download and apply pipeline
//!
//! Resources the checker classified as needing an update become candidates.
//! A group update moves the candidates of one group into a waiting queue and
//! submits them to the transport as agents free up. A resource-pack apply
//! instead extracts candidates, one per tick, from a pack file that was
//! fetched out of band. Both paths end in the same verification:
//!
//! 1. the stored length must equal the served length
//! 2. compressed payloads are checked against the compressed hash, inflated
//!    through a reusable scratch buffer, and checked against the plain length
//! 3. uncompressed payloads are hashed through their decrypted view, because
//!    the XOR key is derived from the plain hash
//!
//! Verified resources are moved into their file system container when the
//! manifest assigns one, marked ready, and recorded in the read-write list.
//! A candidate only leaves the candidate set on success.

use crate::directory::{ReadWriteResourceInfo, ResourceStorage};
use crate::events::{BatchResult, EventSink, StorageEvent};
use crate::file_system::file_system_path;
use crate::read_write_list;
use crate::transport::{DownloadId, DownloadTag, Transport, TransportEvent};
use crate::{DEFAULT_EXTENSION, Result, StorageError};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use strata_crypto::{Crc32Hasher, ResourceHash};
use strata_formats::compression::ScratchBuffer;
use strata_formats::version_list::ResourcePackVersionList;
use strata_formats::{LoadType, ResourceName};
use tracing::{debug, error, info, warn};

/// Chunk size for hashing a pack's data region
const PACK_HASH_CHUNK: usize = 64 * 1024;

/// Predicate polled between batch items; true abandons the rest of the batch
pub type CancelPredicate = Box<dyn FnMut() -> bool>;

/// A resource that needs to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    name: ResourceName,
    file_system_name: Option<String>,
    load_type: LoadType,
    length: u32,
    hash: ResourceHash,
    compressed_length: u32,
    compressed_hash: ResourceHash,
    retry_count: u32,
}

impl UpdateInfo {
    /// Candidate with a fresh retry counter
    pub fn new(
        name: ResourceName,
        file_system_name: Option<String>,
        load_type: LoadType,
        length: u32,
        hash: ResourceHash,
        compressed_length: u32,
        compressed_hash: ResourceHash,
    ) -> Self {
        Self {
            name,
            file_system_name,
            load_type,
            length,
            hash,
            compressed_length,
            compressed_hash,
            retry_count: 0,
        }
    }

    /// Resource identity
    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    /// Target container, if any
    pub fn file_system_name(&self) -> Option<&str> {
        self.file_system_name.as_deref()
    }

    /// Load type
    pub fn load_type(&self) -> LoadType {
        self.load_type
    }

    /// Plain length
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Plain hash
    pub fn hash(&self) -> ResourceHash {
        self.hash
    }

    /// Served length
    pub fn compressed_length(&self) -> u32 {
        self.compressed_length
    }

    /// Served hash
    pub fn compressed_hash(&self) -> ResourceHash {
        self.compressed_hash
    }

    /// Retries spent in the current batch
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether the served bytes are a zlib stream
    pub fn is_compressed(&self) -> bool {
        self.expected().is_compressed()
    }

    fn expected(&self) -> ExpectedPayload {
        ExpectedPayload {
            load_type: self.load_type,
            length: self.length,
            hash: self.hash,
            compressed_length: self.compressed_length,
            compressed_hash: self.compressed_hash,
        }
    }

    /// Remote URI: `{prefix}/{name[.variant]}.{hash}.dat`
    pub fn remote_uri(&self, prefix: &str) -> String {
        format!(
            "{}/{}.{}.{}",
            prefix,
            self.name.full_name(),
            self.hash.to_hex(),
            DEFAULT_EXTENSION
        )
    }
}

/// What a stored payload must match before it is committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExpectedPayload {
    load_type: LoadType,
    length: u32,
    hash: ResourceHash,
    compressed_length: u32,
    compressed_hash: ResourceHash,
}

impl ExpectedPayload {
    fn is_compressed(&self) -> bool {
        self.length != self.compressed_length || self.hash != self.compressed_hash
    }
}

/// Resource-pack entry queued for extraction
///
/// A pack may compress an entry differently from the remote copy, so the
/// entry is verified against its own lengths and hashes.
#[derive(Debug)]
struct ApplyInfo {
    name: ResourceName,
    offset: u64,
    expected: ExpectedPayload,
}

/// Resource pack being applied
struct ApplyBatch {
    pack_path: PathBuf,
    file: File,
    data_offset: u64,
    queue: VecDeque<ApplyInfo>,
    applied: usize,
}

/// Download and apply queues of one session
pub struct ResourceUpdater {
    events: EventSink,
    candidates: BTreeMap<ResourceName, UpdateInfo>,
    waiting: VecDeque<ResourceName>,
    in_flight: HashMap<DownloadId, ResourceName>,
    updating_group: Option<String>,
    apply: Option<ApplyBatch>,
    failure_flag: bool,
    cancelled: bool,
    cancel: Option<CancelPredicate>,
    scratch: ScratchBuffer,
    updating_length: u64,
}

impl ResourceUpdater {
    /// Updater reporting through `events`
    pub fn new(events: EventSink) -> Self {
        Self {
            events,
            candidates: BTreeMap::new(),
            waiting: VecDeque::new(),
            in_flight: HashMap::new(),
            updating_group: None,
            apply: None,
            failure_flag: false,
            cancelled: false,
            cancel: None,
            scratch: ScratchBuffer::new(),
            updating_length: 0,
        }
    }

    /// Install or clear the cancel predicate
    pub fn set_cancel_predicate(&mut self, cancel: Option<CancelPredicate>) {
        self.cancel = cancel;
    }

    /// Register a resource that needs fetching
    pub fn add_candidate(&mut self, info: UpdateInfo) {
        debug!("Update candidate {}", info.name);
        self.candidates.insert(info.name.clone(), info);
    }

    /// Drop every candidate left by an abandoned reconciliation
    pub(crate) fn clear_candidates(&mut self) {
        self.candidates.clear();
    }

    /// Candidate by name
    pub fn candidate(&self, name: &ResourceName) -> Option<&UpdateInfo> {
        self.candidates.get(name)
    }

    /// Number of candidates, queued ones included
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// All candidates in name order
    pub fn candidates(&self) -> impl Iterator<Item = &UpdateInfo> {
        self.candidates.values()
    }

    /// Resources waiting for a free agent
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// Downloads submitted and not yet finished
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Group currently being updated
    pub fn updating_group(&self) -> Option<&str> {
        self.updating_group.as_deref()
    }

    /// Whether a resource pack is being applied
    pub fn is_applying(&self) -> bool {
        self.apply.is_some()
    }

    /// Whether some item of the current or last batch exhausted its retries
    ///
    /// Cleared when the next batch starts.
    pub fn has_failed(&self) -> bool {
        self.failure_flag
    }

    fn require_idle(&self) -> Result<()> {
        if let Some(group) = &self.updating_group {
            return Err(StorageError::InvalidState(format!(
                "resource group '{group}' is being updated"
            )));
        }
        if let Some(batch) = &self.apply {
            return Err(StorageError::InvalidState(format!(
                "resource pack {} is being applied",
                batch.pack_path.display()
            )));
        }
        Ok(())
    }

    /// Start downloading every candidate of `group`
    ///
    /// The empty name is the default group holding every resource.
    pub fn update_resources(&mut self, storage: &ResourceStorage, group: &str) -> Result<()> {
        self.require_idle()?;
        storage.config.update_prefix()?;
        let resource_group = storage
            .directory
            .group(group)
            .ok_or_else(|| StorageError::NotFound(format!("resource group '{group}'")))?;

        self.failure_flag = false;
        self.cancelled = false;
        self.waiting = self
            .candidates
            .keys()
            .filter(|name| resource_group.contains(name))
            .cloned()
            .collect();
        for name in &self.waiting {
            if let Some(info) = self.candidates.get_mut(name) {
                info.retry_count = 0;
            }
        }

        info!(
            "Updating resource group '{}': {} resources",
            group,
            self.waiting.len()
        );
        self.updating_group = Some(group.to_string());
        Ok(())
    }

    /// Queue every current candidate found in the resource pack at `pack_path`
    ///
    /// The pack's data region is hashed before anything is queued. Returns the
    /// number of entries queued; entries are extracted one per tick.
    pub fn apply_resources(&mut self, storage: &ResourceStorage, pack_path: &Path) -> Result<usize> {
        self.require_idle()?;
        storage.config.read_write_dir()?;

        let mut file = File::open(pack_path)?;
        let list = ResourcePackVersionList::read_from(&mut file)?;
        let data_offset = file.stream_position()?;
        verify_pack_data(&mut file, &list)?;

        let mut queue = VecDeque::new();
        let mut total_length = 0u64;
        for resource in &list.resources {
            let Some(candidate) = self.candidates.get(&resource.name) else {
                continue;
            };
            if candidate.load_type != resource.load_type
                || candidate.length != resource.length
                || candidate.hash != resource.hash
            {
                debug!("Pack entry {} does not match its candidate", resource.name);
                continue;
            }
            total_length += u64::from(resource.length);
            queue.push_back(ApplyInfo {
                name: resource.name.clone(),
                offset: resource.offset,
                expected: ExpectedPayload {
                    load_type: resource.load_type,
                    length: resource.length,
                    hash: resource.hash,
                    compressed_length: resource.compressed_length,
                    compressed_hash: resource.compressed_hash,
                },
            });
        }

        let count = queue.len();
        info!(
            "Applying resource pack {}: {} of {} entries are candidates",
            pack_path.display(),
            count,
            list.resources.len()
        );
        self.failure_flag = false;
        self.cancelled = false;
        self.events.emit(StorageEvent::ApplyStart {
            pack_path: pack_path.to_path_buf(),
            count,
            total_length,
        });
        self.apply = Some(ApplyBatch {
            pack_path: pack_path.to_path_buf(),
            file,
            data_offset,
            queue,
            applied: 0,
        });
        Ok(count)
    }

    fn poll_cancel(&mut self) -> bool {
        if self.cancelled {
            return true;
        }
        if let Some(cancel) = self.cancel.as_mut()
            && cancel()
        {
            info!("Update batch cancelled");
            self.cancelled = true;
        }
        self.cancelled
    }

    /// Advance the active batch by one tick
    pub fn update(&mut self, storage: &mut ResourceStorage, transport: &mut dyn Transport) -> Result<()> {
        if self.apply.is_some() {
            return self.update_apply(storage);
        }
        if self.updating_group.is_some() {
            self.submit_downloads(storage, transport)?;
            self.check_group_complete(storage);
        }
        Ok(())
    }

    fn submit_downloads(&mut self, storage: &ResourceStorage, transport: &mut dyn Transport) -> Result<()> {
        let slots = transport
            .free_agent_count()
            .saturating_sub(transport.waiting_task_count());
        let prefix = storage.config.update_prefix()?.to_string();
        let read_write = storage.config.read_write_dir()?.to_path_buf();

        for _ in 0..slots {
            if self.waiting.is_empty() {
                break;
            }
            if self.poll_cancel() {
                self.waiting.clear();
                break;
            }
            let Some(name) = self.waiting.pop_front() else {
                break;
            };
            let Some(info) = self.candidates.get(&name) else {
                continue;
            };

            let path = read_write.join(name.file_name());
            let uri = info.remote_uri(&prefix);
            let submitted = path
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .map_err(StorageError::from)
                .and_then(|()| transport.add_download(&path, &uri, DownloadTag::Resource(name.clone())));
            match submitted {
                Ok(id) => {
                    debug!("Submitted download {} for {}", id, name);
                    self.in_flight.insert(id, name);
                }
                Err(e) => self.handle_download_failure(storage, &name, &path, &e.to_string()),
            }
        }
        Ok(())
    }

    fn check_group_complete(&mut self, storage: &ResourceStorage) {
        if !self.waiting.is_empty() || !self.in_flight.is_empty() {
            return;
        }
        let Some(group) = self.updating_group.take() else {
            return;
        };
        let result = BatchResult {
            success: !self.failure_flag,
            cancelled: self.cancelled,
        };
        if result.success {
            info!("Resource group '{}' updated", group);
        } else {
            error!("Resource group '{}' finished with failures", group);
        }
        self.cancelled = false;
        self.regenerate(storage);
        self.events.emit(StorageEvent::UpdateComplete { group, result });
        if self.candidates.is_empty() {
            self.events.emit(StorageEvent::UpdateAllComplete);
        }
    }

    /// Handle a transport event tagged for a resource
    pub fn on_transport_event(
        &mut self,
        storage: &mut ResourceStorage,
        transport: &mut dyn Transport,
        event: TransportEvent,
    ) {
        let id = event.id();
        let Some(name) = self.in_flight.get(&id).cloned() else {
            debug!("Ignoring event for unknown download {}", id);
            return;
        };
        let Some(expected) = self.candidates.get(&name).map(UpdateInfo::expected) else {
            self.in_flight.remove(&id);
            return;
        };
        let compressed_length = expected.compressed_length;

        match event {
            TransportEvent::Start {
                path,
                uri,
                current_length,
                ..
            } => {
                if current_length > u64::from(compressed_length) {
                    self.abort_oversized(storage, transport, id, &name, &path, current_length);
                    return;
                }
                let retry_count = self.candidates.get(&name).map_or(0, UpdateInfo::retry_count);
                self.events.emit(StorageEvent::UpdateStart {
                    name,
                    path,
                    uri,
                    current_length,
                    compressed_length,
                    retry_count,
                });
            }
            TransportEvent::Update { current_length, .. } => {
                if current_length > u64::from(compressed_length) {
                    let path = self.loose_path(storage, &name);
                    self.abort_oversized(storage, transport, id, &name, &path, current_length);
                    return;
                }
                self.events.emit(StorageEvent::UpdateChanged {
                    name,
                    current_length,
                    compressed_length,
                });
            }
            TransportEvent::Success { path, length, .. } => {
                self.in_flight.remove(&id);
                if length != u64::from(compressed_length) {
                    let message = format!("downloaded length {length} != expected {compressed_length}");
                    self.handle_download_failure(storage, &name, &path, &message);
                    return;
                }
                match self.verify_and_commit(storage, &name, &path, &expected) {
                    Ok(final_path) => {
                        self.finish_success(storage, &name, final_path, compressed_length, false);
                    }
                    Err(e) => self.handle_download_failure(storage, &name, &path, &e.to_string()),
                }
            }
            TransportEvent::Failure { path, message, .. } => {
                self.in_flight.remove(&id);
                self.handle_download_failure(storage, &name, &path, &message);
            }
        }
    }

    fn loose_path(&self, storage: &ResourceStorage, name: &ResourceName) -> PathBuf {
        storage
            .config
            .read_write_dir()
            .map_or_else(|_| PathBuf::from(name.file_name()), |rw| rw.join(name.file_name()))
    }

    fn abort_oversized(
        &mut self,
        storage: &ResourceStorage,
        transport: &mut dyn Transport,
        id: DownloadId,
        name: &ResourceName,
        path: &Path,
        current_length: u64,
    ) {
        transport.remove_download(id);
        self.in_flight.remove(&id);
        let message = format!("received {current_length} bytes, more than the served length");
        self.handle_download_failure(storage, name, path, &message);
    }

    fn handle_download_failure(
        &mut self,
        storage: &ResourceStorage,
        name: &ResourceName,
        path: &Path,
        message: &str,
    ) {
        remove_if_exists(path);
        let total_retry_count = storage.config.update_retry_count;
        let prefix = storage.config.update_prefix().unwrap_or_default();
        let Some(info) = self.candidates.get_mut(name) else {
            return;
        };
        let uri = info.remote_uri(prefix);
        warn!("Update of {} failed: {}", name, message);

        let retry_count = info.retry_count;
        if info.retry_count < total_retry_count {
            info.retry_count += 1;
            if !self.cancelled {
                self.waiting.push_back(name.clone());
            }
        } else {
            info.retry_count = 0;
            self.failure_flag = true;
        }
        self.events.emit(StorageEvent::UpdateFailure {
            name: name.clone(),
            uri,
            retry_count,
            total_retry_count,
            message: message.to_string(),
        });
    }

    fn update_apply(&mut self, storage: &mut ResourceStorage) -> Result<()> {
        let cancelled = self.poll_cancel();
        let Some(batch) = self.apply.as_mut() else {
            return Ok(());
        };
        if cancelled {
            batch.queue.clear();
        }
        let Some(entry) = batch.queue.pop_front() else {
            return self.finish_apply(storage);
        };

        let pack_path = batch.pack_path.clone();
        let loose = self.loose_path(storage, &entry.name);
        let extracted = self
            .extract_entry(&entry, &loose)
            .and_then(|()| self.verify_and_commit(storage, &entry.name, &loose, &entry.expected));
        match extracted {
            Ok(final_path) => {
                if let Some(batch) = self.apply.as_mut() {
                    batch.applied += 1;
                }
                let packed_length = entry.expected.compressed_length;
                self.finish_success(storage, &entry.name, final_path, packed_length, true);
            }
            Err(e) => {
                remove_if_exists(&loose);
                warn!("Apply of {} failed: {}", entry.name, e);
                self.failure_flag = true;
                self.events.emit(StorageEvent::ApplyFailure {
                    name: entry.name,
                    pack_path,
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    fn extract_entry(&mut self, entry: &ApplyInfo, destination: &Path) -> Result<()> {
        let batch = self
            .apply
            .as_mut()
            .ok_or_else(|| StorageError::Invariant("apply batch vanished".to_string()))?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let length = u64::from(entry.expected.compressed_length);
        let start = batch.data_offset + entry.offset;
        let saved = batch.file.stream_position()?;
        let copied = copy_segment(&mut batch.file, start, length, destination);
        batch.file.seek(SeekFrom::Start(saved))?;
        let copied = copied?;
        if copied != length {
            return Err(StorageError::Verification(format!(
                "{}: pack entry truncated at {copied} of {length} bytes",
                entry.name
            )));
        }
        Ok(())
    }

    fn finish_apply(&mut self, storage: &ResourceStorage) -> Result<()> {
        let Some(batch) = self.apply.take() else {
            return Ok(());
        };
        let result = BatchResult {
            success: !self.failure_flag,
            cancelled: self.cancelled,
        };
        info!(
            "Applied {} resources from {}",
            batch.applied,
            batch.pack_path.display()
        );
        self.cancelled = false;
        if batch.applied > 0 {
            self.regenerate(storage);
        }
        self.events.emit(StorageEvent::ApplyComplete {
            pack_path: batch.pack_path,
            result,
        });
        if self.candidates.is_empty() {
            self.events.emit(StorageEvent::UpdateAllComplete);
        }
        Ok(())
    }

    /// Verify the file at `loose` against `expected` and commit candidate `name`
    ///
    /// Returns where the verified bytes ended up.
    fn verify_and_commit(
        &mut self,
        storage: &mut ResourceStorage,
        name: &ResourceName,
        loose: &Path,
        expected: &ExpectedPayload,
    ) -> Result<PathBuf> {
        verify_payload(&mut self.scratch, name, loose, expected)?;
        let info = self
            .candidates
            .get(name)
            .ok_or_else(|| StorageError::Invariant(format!("{name} is not a candidate")))?;

        let read_write = storage.config.read_write_dir()?.to_path_buf();
        let final_path = match &info.file_system_name {
            Some(file_system) => {
                let path = file_system_path(&read_write, file_system);
                let store = storage.file_systems.open_or_create(&path)?;
                if !store.write_file_from_path(&name.file_name(), loose)? {
                    return Err(StorageError::Verification(format!(
                        "{name}: verified file vanished before it reached {}",
                        path.display()
                    )));
                }
                fs::remove_file(loose)?;
                path
            }
            None => loose.to_path_buf(),
        };

        storage.directory.mark_ready(name)?;
        storage.directory.set_read_write(
            name.clone(),
            ReadWriteResourceInfo {
                file_system_name: info.file_system_name.clone(),
                load_type: info.load_type,
                length: info.length,
                hash: info.hash,
            },
        );
        Ok(final_path)
    }

    fn finish_success(
        &mut self,
        storage: &ResourceStorage,
        name: &ResourceName,
        path: PathBuf,
        compressed_length: u32,
        applied: bool,
    ) {
        let Some(info) = self.candidates.remove(name) else {
            return;
        };
        debug!("{} is ready at {}", name, path.display());
        self.updating_length += u64::from(compressed_length);

        let drained = self.waiting.is_empty() && self.in_flight.is_empty();
        let apply_drained = self.apply.as_ref().is_none_or(|batch| batch.queue.is_empty());
        if (drained && apply_drained)
            || self.updating_length >= storage.config.generate_read_write_version_list_length
        {
            self.regenerate(storage);
        }

        let event = if applied {
            StorageEvent::ApplySuccess {
                name: name.clone(),
                path,
                length: info.length,
                compressed_length,
            }
        } else {
            StorageEvent::UpdateSuccess {
                name: name.clone(),
                path,
                length: info.length,
                compressed_length,
            }
        };
        self.events.emit(event);
    }

    fn regenerate(&mut self, storage: &ResourceStorage) {
        let Ok(read_write) = storage.config.read_write_dir() else {
            return;
        };
        if let Err(e) = read_write_list::generate(read_write, &storage.directory) {
            warn!("Read-write list regeneration failed: {}", e);
            return;
        }
        self.updating_length = 0;
    }
}

/// Check the stored file at `loose`; compressed payloads are inflated in place
fn verify_payload(
    scratch: &mut ScratchBuffer,
    name: &ResourceName,
    loose: &Path,
    expected: &ExpectedPayload,
) -> Result<()> {
    let stored = fs::read(loose)?;
    if stored.len() != expected.compressed_length as usize {
        return Err(StorageError::Verification(format!(
            "{name}: length {} != expected {}",
            stored.len(),
            expected.compressed_length
        )));
    }

    if expected.is_compressed() {
        let hash = ResourceHash::of(&stored);
        if hash != expected.compressed_hash {
            return Err(StorageError::Verification(format!(
                "{name}: compressed hash {hash} != expected {}",
                expected.compressed_hash
            )));
        }
        let length = expected.length as usize;
        scratch.with_decompressed(&stored, |plain| {
            if plain.len() != length {
                return Err(StorageError::Verification(format!(
                    "{name}: decompressed length {} != expected {length}",
                    plain.len()
                )));
            }
            fs::write(loose, plain)?;
            Ok(())
        })??;
    } else {
        let hash = expected.load_type.verify_hash(&stored, expected.hash);
        if hash != expected.hash {
            return Err(StorageError::Verification(format!(
                "{name}: hash {hash} != expected {}",
                expected.hash
            )));
        }
    }
    Ok(())
}

/// Copy `length` bytes at `start` of `file` into a new file at `destination`
fn copy_segment(file: &mut File, start: u64, length: u64, destination: &Path) -> io::Result<u64> {
    file.seek(SeekFrom::Start(start))?;
    let mut out = File::create(destination)?;
    io::copy(&mut file.take(length), &mut out)
}

fn verify_pack_data(file: &mut File, list: &ResourcePackVersionList) -> Result<()> {
    let mut hasher = Crc32Hasher::new();
    let mut remaining = list.data_length;
    let mut chunk = vec![0u8; PACK_HASH_CHUNK];
    while remaining > 0 {
        let size = remaining.min(PACK_HASH_CHUNK as u64) as usize;
        file.read_exact(&mut chunk[..size])?;
        hasher.update(&chunk[..size]);
        remaining -= size as u64;
    }
    let hash = hasher.finalize();
    if hash != list.data_hash {
        return Err(StorageError::Verification(format!(
            "resource pack data hash {hash} != expected {}",
            list.data_hash
        )));
    }
    Ok(())
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to delete {}: {}", path.display(), e);
    }
}
