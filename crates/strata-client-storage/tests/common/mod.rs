//! Shared fixtures: a scripted transport and an on-disk install

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use strata_client_storage::{
    CheckSummary, CheckVersionListResult, DownloadId, DownloadTag, StorageConfig, StorageEvent,
    StorageSession, Transport, TransportEvent, VersionPointer,
};
use strata_formats::compression;
use strata_formats::version_list::{UpdatableVersionList, VersionListFormat};
use strata_formats::{LoadType, ResourceName, ResourcePayload};
use tempfile::TempDir;

pub const PREFIX: &str = "https://cdn.test/game";

/// Files the fake server can serve, plus a log of requested URIs
#[derive(Debug, Default)]
pub struct Server {
    pub files: HashMap<String, Vec<u8>>,
    pub requests: Vec<String>,
}

/// Transport that completes every download on the tick after submission
pub struct ScriptedTransport {
    server: Rc<RefCell<Server>>,
    agents: usize,
    next_id: DownloadId,
    events: VecDeque<TransportEvent>,
}

impl ScriptedTransport {
    pub fn new(server: Rc<RefCell<Server>>, agents: usize) -> Self {
        Self {
            server,
            agents,
            next_id: 1,
            events: VecDeque::new(),
        }
    }
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

        let mut server = self.server.borrow_mut();
        server.requests.push(uri.to_string());
        self.events.push_back(TransportEvent::Start {
            id,
            tag: tag.clone(),
            path: path.to_path_buf(),
            uri: uri.to_string(),
            current_length: 0,
        });
        match server.files.get(uri) {
            Some(bytes) => {
                fs::write(path, bytes)?;
                self.events.push_back(TransportEvent::Update {
                    id,
                    tag: tag.clone(),
                    current_length: bytes.len() as u64,
                });
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
        self.agents
    }

    fn waiting_task_count(&self) -> usize {
        0
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }
}

/// One client install: read-only and read-write paths plus a fake server
pub struct Fixture {
    _dir: TempDir,
    pub read_only: PathBuf,
    pub read_write: PathBuf,
    pub server: Rc<RefCell<Server>>,
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
            server: Rc::new(RefCell::new(Server::default())),
        }
    }

    pub fn config(&self) -> StorageConfig {
        StorageConfig::new(&self.read_only, &self.read_write).with_update_prefix_uri(PREFIX)
    }

    pub fn session(&self, config: StorageConfig, agents: usize) -> StorageSession {
        let transport = ScriptedTransport::new(Rc::clone(&self.server), agents);
        StorageSession::new(config, Box::new(transport)).unwrap()
    }

    /// Serve `list` compressed and return the pointer describing it
    pub fn publish_manifest(&self, list: &UpdatableVersionList) -> VersionPointer {
        let plain = list.build().unwrap();
        let compressed = compression::compress(&plain).unwrap();
        let pointer = VersionPointer {
            applicable_version: list.applicable_version.clone(),
            internal_version: list.internal_version,
            version_list_length: plain.len() as u32,
            version_list_hash_code: strata_crypto::ResourceHash::of(&plain).value(),
            version_list_compressed_length: compressed.len() as u32,
            version_list_compressed_hash_code: strata_crypto::ResourceHash::of(&compressed).value(),
            update_prefix_uri: None,
        };
        self.server
            .borrow_mut()
            .files
            .insert(format!("{PREFIX}/{}", pointer.file_name()), compressed);
        pointer
    }

    /// Serve `payload` under the URI the updater derives for `name`
    pub fn publish_resource(&self, name: &ResourceName, payload: &ResourcePayload) {
        let uri = format!("{PREFIX}/{}.{}.dat", name.full_name(), payload.hash.to_hex());
        self.server.borrow_mut().files.insert(uri, payload.bytes.clone());
    }

    pub fn requests(&self) -> Vec<String> {
        self.server.borrow().requests.clone()
    }
}

pub fn payload(load_type: LoadType, plain: &[u8], compress: bool) -> ResourcePayload {
    ResourcePayload::encode(load_type, plain, compress).unwrap()
}

/// Tick until `done` matches an event, returning everything seen
pub fn run_until(
    session: &mut StorageSession,
    done: impl Fn(&StorageEvent) -> bool,
) -> Vec<StorageEvent> {
    let mut seen = Vec::new();
    for _ in 0..64 {
        session.update().unwrap();
        let events = session.drain_events();
        let finished = events.iter().any(&done);
        seen.extend(events);
        if finished {
            return seen;
        }
    }
    panic!("condition not reached; events: {seen:#?}");
}

/// Fetch the manifest if needed and reconcile, returning the check summary
pub fn bootstrap(session: &mut StorageSession, pointer: &VersionPointer) -> CheckSummary {
    if session.check_version_list(pointer).unwrap() == CheckVersionListResult::NeedUpdate {
        session.update_version_list(pointer).unwrap();
        let events = run_until(session, |e| {
            matches!(
                e,
                StorageEvent::VersionListUpdateSuccess { .. }
                    | StorageEvent::VersionListUpdateFailure { .. }
            )
        });
        assert!(
            events
                .iter()
                .any(|e| matches!(e, StorageEvent::VersionListUpdateSuccess { .. })),
            "manifest update failed: {events:#?}"
        );
    }

    session.check_resources().unwrap();
    let events = run_until(session, |e| matches!(e, StorageEvent::CheckComplete(_)));
    events
        .into_iter()
        .find_map(|e| match e {
            StorageEvent::CheckComplete(summary) => Some(summary),
            _ => None,
        })
        .unwrap()
}
