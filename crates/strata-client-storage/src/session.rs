//! The storage session: one install, one transport, one event stream

use crate::checker::ResourceChecker;
use crate::config::StorageConfig;
use crate::directory::{ResourceDirectory, ResourceStorage};
use crate::events::{EventSink, StorageEvent};
use crate::initer::ResourceIniter;
use crate::read_write_list;
use crate::transport::{DownloadTag, Transport};
use crate::updater::{CancelPredicate, ResourceUpdater};
use crate::version_list_processor::{CheckVersionListResult, VersionListProcessor, VersionPointer};
use crate::{LOCAL_VERSION_LIST_FILE_NAME, Result, StorageError};
use std::fs;
use std::path::Path;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{error, info};

/// Owns every storage component of one client install
///
/// Nothing happens in the background: the host calls [`StorageSession::update`]
/// from its tick and drains [`StorageSession::poll_event`] afterwards.
pub struct StorageSession {
    storage: ResourceStorage,
    transport: Box<dyn Transport>,
    checker: Option<ResourceChecker>,
    processor: VersionListProcessor,
    updater: ResourceUpdater,
    sink: EventSink,
    events: UnboundedReceiver<StorageEvent>,
}

impl StorageSession {
    /// Create a session; both storage paths must be configured
    pub fn new(config: StorageConfig, transport: Box<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let (sender, events) = mpsc::unbounded_channel();
        let sink = EventSink::new(sender);
        info!(
            "Storage session: read-only {}, read-write {}",
            config.read_only_dir()?.display(),
            config.read_write_dir()?.display()
        );
        Ok(Self {
            storage: ResourceStorage::new(config),
            transport,
            checker: None,
            processor: VersionListProcessor::new(sink.clone()),
            updater: ResourceUpdater::new(sink.clone()),
            sink,
            events,
        })
    }

    /// Storage configuration
    pub fn config(&self) -> &StorageConfig {
        &self.storage.config
    }

    /// Shared state
    pub fn storage(&self) -> &ResourceStorage {
        &self.storage
    }

    /// Shared state, mutably
    pub fn storage_mut(&mut self) -> &mut ResourceStorage {
        &mut self.storage
    }

    /// Resource directory
    pub fn directory(&self) -> &ResourceDirectory {
        &self.storage.directory
    }

    /// Download and apply pipeline
    pub fn updater(&self) -> &ResourceUpdater {
        &self.updater
    }

    /// Install or clear the batch cancel predicate
    pub fn set_cancel_predicate(&mut self, cancel: Option<CancelPredicate>) {
        self.updater.set_cancel_predicate(cancel);
    }

    /// Whether the manifest named by `pointer` is already on disk
    ///
    /// A prefix URI carried by the pointer replaces the configured one.
    pub fn check_version_list(&mut self, pointer: &VersionPointer) -> Result<CheckVersionListResult> {
        if let Some(prefix) = pointer.update_prefix_uri.as_deref().filter(|p| !p.is_empty()) {
            self.storage.config.update_prefix_uri = prefix.to_string();
        }
        self.processor.check_version_list(&self.storage, pointer)
    }

    /// Start downloading the manifest named by `pointer`
    pub fn update_version_list(&mut self, pointer: &VersionPointer) -> Result<()> {
        self.processor
            .update_version_list(&self.storage, self.transport.as_mut(), pointer)
    }

    /// Start reconciling the verified manifest with the local lists
    ///
    /// The check completes on a later [`StorageSession::update`], which sends
    /// [`StorageEvent::CheckComplete`] or [`StorageEvent::CheckFailure`]. After
    /// a failure the check may be started again.
    pub fn check_resources(&mut self) -> Result<()> {
        if self.checker.is_some() {
            return Err(StorageError::InvalidState(
                "resources have already been checked this session".to_string(),
            ));
        }
        let version_list = self.processor.version_list_path().ok_or_else(|| {
            StorageError::InvalidState("the remote version list is not in place".to_string())
        })?;
        let read_write = self.storage.config.read_write_dir()?;
        let read_only = self.storage.config.read_only_dir()?;

        read_write_list::recover_backup(read_write)?;
        let mut checker = ResourceChecker::new();
        checker.feed_updatable_version_list(fs::read(version_list)?)?;
        checker.feed_read_only_version_list(read_write_list::read_optional(
            &read_only.join(LOCAL_VERSION_LIST_FILE_NAME),
        )?)?;
        checker.feed_read_write_version_list(read_write_list::read(read_write)?)?;
        self.checker = Some(checker);
        Ok(())
    }

    /// Whether reconciliation has finished
    pub fn is_checked(&self) -> bool {
        self.checker.as_ref().is_some_and(ResourceChecker::is_completed)
    }

    /// Populate the directory from the package list (non-updatable builds)
    pub fn init_resources(&mut self) -> Result<usize> {
        ResourceIniter::new().init_resources(&mut self.storage)
    }

    /// Start downloading the candidates of `group`
    pub fn update_resources(&mut self, group: &str) -> Result<()> {
        if !self.is_checked() {
            return Err(StorageError::InvalidState(
                "resources must be checked before they are updated".to_string(),
            ));
        }
        self.updater.update_resources(&self.storage, group)
    }

    /// Queue the candidates found in the resource pack at `pack_path`
    pub fn apply_resources(&mut self, pack_path: &Path) -> Result<usize> {
        if !self.is_checked() {
            return Err(StorageError::InvalidState(
                "resources must be checked before a pack is applied".to_string(),
            ));
        }
        self.updater.apply_resources(&self.storage, pack_path)
    }

    /// Advance every component by one tick
    pub fn update(&mut self) -> Result<()> {
        if let Some(checker) = self.checker.as_mut()
            && !checker.is_completed()
        {
            match checker.poll(&mut self.storage, &mut self.updater) {
                Ok(Some(summary)) => self.sink.emit(StorageEvent::CheckComplete(summary)),
                Ok(None) => {}
                Err(e) => {
                    error!("Resource check failed: {}", e);
                    self.checker = None;
                    self.storage.directory.clear();
                    self.updater.clear_candidates();
                    self.sink.emit(StorageEvent::CheckFailure {
                        message: e.to_string(),
                    });
                }
            }
        }

        while let Some(event) = self.transport.poll_event() {
            if matches!(event.tag(), DownloadTag::VersionList(_)) {
                self.processor.on_transport_event(self.transport.as_mut(), event);
            } else {
                self.updater
                    .on_transport_event(&mut self.storage, self.transport.as_mut(), event);
            }
        }

        self.updater.update(&mut self.storage, self.transport.as_mut())
    }

    /// Next event reported by any component
    pub fn poll_event(&mut self) -> Option<StorageEvent> {
        self.events.try_recv().ok()
    }

    /// Drain every pending event
    pub fn drain_events(&mut self) -> Vec<StorageEvent> {
        std::iter::from_fn(|| self.poll_event()).collect()
    }
}
