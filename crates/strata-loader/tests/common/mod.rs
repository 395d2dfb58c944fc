//! Shared fixtures: a text container codec, a package install and a fake server

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use strata_client_storage::file_system::{FileSystemStore, file_system_path};
use strata_client_storage::{
    DownloadId, DownloadTag, PACKAGE_VERSION_LIST_FILE_NAME, StorageConfig, Transport,
    TransportEvent, VersionPointer,
};
use strata_crypto::ResourceHash;
use strata_formats::compression;
use strata_formats::version_list::{PackageVersionList, UpdatableVersionList, VersionListFormat};
use strata_formats::{LoadType, ResourceName, ResourcePayload};
use strata_loader::{
    HelperEvent, LoadAgentHelper, LoadEvent, LoadStage, LoadStatus, LoadTicket, LoaderConfig,
    ReadSource, ResourceHelper, ResourceManager,
};
use tempfile::TempDir;

pub const PREFIX: &str = "https://cdn.test/game";

pub type Manager = ResourceManager<String, String>;

/// Everything the engine side was asked to do
#[derive(Debug, Default)]
pub struct Log {
    pub reads: Vec<ReadSource>,
    pub parsed: Vec<Vec<u8>>,
    pub extracted: Vec<String>,
    pub released_containers: Vec<String>,
    pub released_assets: Vec<String>,
    pub unloaded_scenes: Vec<String>,
    /// Assets whose extraction fails
    pub broken: HashSet<String>,
}

/// Containers are UTF-8 text; an asset is `<name>@<container text>`
pub struct TextAgentHelper {
    log: Rc<RefCell<Log>>,
    pending: VecDeque<HelperEvent<String, String>>,
}

fn read_source(source: &ReadSource) -> Result<Vec<u8>, String> {
    match source {
        ReadSource::File(path) => fs::read(path).map_err(|e| e.to_string()),
        ReadSource::FileSystem { path, entry, .. } => {
            let mut store = FileSystemStore::load(path, false).map_err(|e| e.to_string())?;
            store
                .read_file(entry)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("{entry} missing"))
        }
    }
}

impl LoadAgentHelper<String, String> for TextAgentHelper {
    fn read_file(&mut self, source: &ReadSource) -> Result<(), String> {
        self.log.borrow_mut().reads.push(source.clone());
        let bytes = read_source(source)?;
        let text = String::from_utf8(bytes).map_err(|e| e.to_string())?;
        self.pending.push_back(HelperEvent::Progress {
            stage: LoadStage::ReadResource,
            progress: 1.0,
        });
        self.pending.push_back(HelperEvent::ReadFileComplete(text));
        Ok(())
    }

    fn read_bytes(&mut self, source: &ReadSource) -> Result<(), String> {
        self.log.borrow_mut().reads.push(source.clone());
        let bytes = read_source(source)?;
        self.pending.push_back(HelperEvent::ReadBytesComplete(bytes));
        Ok(())
    }

    fn parse_bytes(&mut self, bytes: Vec<u8>) -> Result<(), String> {
        self.log.borrow_mut().parsed.push(bytes.clone());
        match String::from_utf8(bytes) {
            Ok(text) => self.pending.push_back(HelperEvent::ParseBytesComplete(text)),
            Err(e) => self.pending.push_back(HelperEvent::Error {
                status: LoadStatus::AssetError,
                message: e.to_string(),
            }),
        }
        Ok(())
    }

    fn load_asset(&mut self, container: &String, asset_name: &str) -> Result<(), String> {
        let mut log = self.log.borrow_mut();
        if log.broken.contains(asset_name) {
            self.pending.push_back(HelperEvent::Error {
                status: LoadStatus::AssetError,
                message: format!("{asset_name} is corrupt"),
            });
            return Ok(());
        }
        log.extracted.push(asset_name.to_string());
        self.pending
            .push_back(HelperEvent::LoadAssetComplete(format!("{asset_name}@{container}")));
        Ok(())
    }

    fn load_scene(&mut self, _container: &String, _scene_asset_name: &str) -> Result<(), String> {
        self.pending.push_back(HelperEvent::LoadSceneComplete);
        Ok(())
    }

    fn poll(&mut self) -> Option<HelperEvent<String, String>> {
        self.pending.pop_front()
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

pub struct TextHelper {
    pub log: Rc<RefCell<Log>>,
}

impl ResourceHelper<String, String> for TextHelper {
    fn create_agent_helper(&mut self) -> Box<dyn LoadAgentHelper<String, String>> {
        Box::new(TextAgentHelper {
            log: Rc::clone(&self.log),
            pending: VecDeque::new(),
        })
    }

    fn release_container(&mut self, container: &String) {
        self.log.borrow_mut().released_containers.push(container.clone());
    }

    fn release_asset(&mut self, asset: &String) {
        self.log.borrow_mut().released_assets.push(asset.clone());
    }

    fn unload_scene(&mut self, scene_asset_name: &str) -> Result<(), String> {
        self.log
            .borrow_mut()
            .unloaded_scenes
            .push(scene_asset_name.to_string());
        Ok(())
    }
}

/// Transport that completes every download on the tick after submission
pub struct ScriptedTransport {
    files: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    next_id: DownloadId,
    events: VecDeque<TransportEvent>,
}

impl Transport for ScriptedTransport {
    fn add_download(
        &mut self,
        path: &Path,
        uri: &str,
        tag: DownloadTag,
    ) -> strata_client_storage::Result<DownloadId> {
        let id = self.next_id;
        self.next_id += 1;
        match self.files.borrow().get(uri) {
            Some(bytes) => {
                fs::write(path, bytes)?;
                self.events.push_back(TransportEvent::Success {
                    id,
                    tag,
                    path: path.to_path_buf(),
                    length: bytes.len() as u64,
                });
            }
            None => self.events.push_back(TransportEvent::Failure {
                id,
                tag,
                path: path.to_path_buf(),
                message: "404 Not Found".to_string(),
            }),
        }
        Ok(id)
    }

    fn remove_download(&mut self, id: DownloadId) -> bool {
        let before = self.events.len();
        self.events.retain(|event| event.id() != id);
        before != self.events.len()
    }

    fn free_agent_count(&self) -> usize {
        4
    }

    fn waiting_task_count(&self) -> usize {
        0
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }
}

/// One client install plus the server it updates from
pub struct Fixture {
    _dir: TempDir,
    pub read_only: PathBuf,
    pub read_write: PathBuf,
    pub files: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    pub log: Rc<RefCell<Log>>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let read_only = dir.path().join("ro");
        let read_write = dir.path().join("rw");
        fs::create_dir_all(&read_only).unwrap();
        fs::create_dir_all(&read_write).unwrap();
        Self {
            _dir: dir,
            read_only,
            read_write,
            files: Rc::new(RefCell::new(HashMap::new())),
            log: Rc::new(RefCell::new(Log::default())),
        }
    }

    pub fn manager(&self, config: &LoaderConfig) -> Manager {
        let storage = StorageConfig::new(&self.read_only, &self.read_write).with_update_prefix_uri(PREFIX);
        let transport = ScriptedTransport {
            files: Rc::clone(&self.files),
            next_id: 1,
            events: VecDeque::new(),
        };
        let helper = TextHelper {
            log: Rc::clone(&self.log),
        };
        ResourceManager::new(storage, Box::new(transport), config, Box::new(helper)).unwrap()
    }

    /// Ship `list` and return a manager initialised from it
    pub fn package(&self, list: &PackageVersionList) -> Manager {
        fs::write(
            self.read_only.join(PACKAGE_VERSION_LIST_FILE_NAME),
            list.build().unwrap(),
        )
        .unwrap();
        let mut manager = self.manager(&LoaderConfig::new());
        manager.init_resources().unwrap();
        manager
    }

    /// Ship a loose resource, stored the way `load_type` expects
    pub fn ship(&self, name: &ResourceName, load_type: LoadType, plain: &[u8]) {
        let path = self.read_only.join(name.file_name());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, stored(load_type, plain)).unwrap();
    }

    /// Ship a resource inside the container `file_system`
    pub fn ship_in(&self, file_system: &str, name: &ResourceName, load_type: LoadType, plain: &[u8]) {
        let path = file_system_path(&self.read_only, file_system);
        let mut store = if path.exists() {
            FileSystemStore::load(&path, true).unwrap()
        } else {
            FileSystemStore::create(&path).unwrap()
        };
        store
            .write_file(&name.file_name(), &stored(load_type, plain))
            .unwrap();
    }

    /// Serve `list` compressed and return the pointer describing it
    pub fn publish_manifest(&self, list: &UpdatableVersionList) -> VersionPointer {
        let plain = list.build().unwrap();
        let compressed = compression::compress(&plain).unwrap();
        let pointer = VersionPointer {
            applicable_version: list.applicable_version.clone(),
            internal_version: list.internal_version,
            version_list_length: plain.len() as u32,
            version_list_hash_code: ResourceHash::of(&plain).value(),
            version_list_compressed_length: compressed.len() as u32,
            version_list_compressed_hash_code: ResourceHash::of(&compressed).value(),
            update_prefix_uri: None,
        };
        self.files
            .borrow_mut()
            .insert(format!("{PREFIX}/{}", pointer.file_name()), compressed);
        pointer
    }

    /// Serve `payload` under the URI the updater derives for `name`
    pub fn publish_resource(&self, name: &ResourceName, payload: &ResourcePayload) {
        let uri = format!("{PREFIX}/{}.{}.dat", name.full_name(), payload.hash.to_hex());
        self.files.borrow_mut().insert(uri, payload.bytes.clone());
    }
}

/// Bytes as they sit on disk for `load_type`
pub fn stored(load_type: LoadType, plain: &[u8]) -> Vec<u8> {
    let mut data = plain.to_vec();
    load_type.decrypt(&mut data, ResourceHash::of(plain));
    data
}

pub fn name(base: &str) -> ResourceName {
    ResourceName::new(base, None::<&str>, Some("dat"))
}

/// Tick until `ticket` gets its final event, returning every event seen
pub fn pump(manager: &mut Manager, ticket: LoadTicket) -> Vec<LoadEvent<String>> {
    let mut seen = Vec::new();
    for _ in 0..32 {
        manager.update(Duration::from_millis(16)).unwrap();
        while let Some(event) = manager.poll_load_event() {
            let finished = event.ticket() == ticket && event.is_terminal();
            seen.push(event);
            if finished {
                return seen;
            }
        }
    }
    panic!("ticket {ticket} never finished; events: {seen:#?}");
}

/// The final event of `ticket`
pub fn outcome(events: &[LoadEvent<String>], ticket: LoadTicket) -> &LoadEvent<String> {
    events
        .iter()
        .find(|e| e.ticket() == ticket && e.is_terminal())
        .unwrap()
}
