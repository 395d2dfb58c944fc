//! One object for the host to tick

use crate::config::LoaderConfig;
use crate::error::Result;
use crate::events::{LoadEvent, LoadTicket};
use crate::helper::ResourceHelper;
use crate::loader::{BinaryLocation, HasAssetResult, ResourceLoader};
use std::path::Path;
use std::time::Duration;
use strata_client_storage::{
    CheckVersionListResult, StorageConfig, StorageEvent, StorageSession, Transport, VersionPointer,
};

/// Storage session and loader driven together
///
/// The session verifies and downloads resources; the loader reads the
/// directory the session maintains. [`ResourceManager::update`] advances
/// both in that order, so a resource that becomes ready during a tick can be
/// loaded in the same tick.
pub struct ResourceManager<C, A> {
    session: StorageSession,
    loader: ResourceLoader<C, A>,
}

impl<C, A> ResourceManager<C, A> {
    /// Session over `transport` plus a loader using `helper`
    pub fn new(
        storage_config: StorageConfig,
        transport: Box<dyn Transport>,
        loader_config: &LoaderConfig,
        helper: Box<dyn ResourceHelper<C, A>>,
    ) -> Result<Self> {
        Ok(Self {
            session: StorageSession::new(storage_config, transport)?,
            loader: ResourceLoader::new(loader_config, helper)?,
        })
    }

    /// Storage session
    pub fn session(&self) -> &StorageSession {
        &self.session
    }

    /// Mutable storage session
    pub fn session_mut(&mut self) -> &mut StorageSession {
        &mut self.session
    }

    /// Loader
    pub fn loader(&self) -> &ResourceLoader<C, A> {
        &self.loader
    }

    /// Mutable loader
    pub fn loader_mut(&mut self) -> &mut ResourceLoader<C, A> {
        &mut self.loader
    }

    /// See [`StorageSession::check_version_list`]
    pub fn check_version_list(&mut self, pointer: &VersionPointer) -> Result<CheckVersionListResult> {
        Ok(self.session.check_version_list(pointer)?)
    }

    /// See [`StorageSession::update_version_list`]
    pub fn update_version_list(&mut self, pointer: &VersionPointer) -> Result<()> {
        Ok(self.session.update_version_list(pointer)?)
    }

    /// See [`StorageSession::check_resources`]
    pub fn check_resources(&mut self) -> Result<()> {
        Ok(self.session.check_resources()?)
    }

    /// See [`StorageSession::is_checked`]
    pub fn is_checked(&self) -> bool {
        self.session.is_checked()
    }

    /// See [`StorageSession::init_resources`]
    pub fn init_resources(&mut self) -> Result<usize> {
        Ok(self.session.init_resources()?)
    }

    /// See [`StorageSession::update_resources`]
    pub fn update_resources(&mut self, group: &str) -> Result<()> {
        Ok(self.session.update_resources(group)?)
    }

    /// See [`StorageSession::apply_resources`]
    pub fn apply_resources(&mut self, pack_path: &Path) -> Result<usize> {
        Ok(self.session.apply_resources(pack_path)?)
    }

    /// See [`ResourceLoader::has_asset`]
    pub fn has_asset(&self, asset_name: &str) -> HasAssetResult {
        self.loader.has_asset(self.session.storage(), asset_name)
    }

    /// See [`ResourceLoader::load_asset`]
    pub fn load_asset(&mut self, asset_name: &str, priority: i32) -> Result<LoadTicket> {
        self.loader
            .load_asset(self.session.storage(), asset_name, priority)
    }

    /// See [`ResourceLoader::load_scene`]
    pub fn load_scene(&mut self, scene_asset_name: &str, priority: i32) -> Result<LoadTicket> {
        self.loader
            .load_scene(self.session.storage(), scene_asset_name, priority)
    }

    /// See [`ResourceLoader::unload_asset`]
    pub fn unload_asset(&mut self, asset_name: &str) -> Result<()> {
        self.loader.unload_asset(asset_name)
    }

    /// See [`ResourceLoader::unload_scene`]
    pub fn unload_scene(&mut self, scene_asset_name: &str) -> Result<()> {
        self.loader.unload_scene(scene_asset_name)
    }

    /// See [`ResourceLoader::release_all_unused`]
    pub fn release_all_unused(&mut self) -> Result<usize> {
        self.loader.release_all_unused()
    }

    /// See [`ResourceLoader::binary_path`]
    pub fn binary_path(&self, binary_asset_name: &str) -> Result<BinaryLocation> {
        self.loader
            .binary_path(self.session.storage(), binary_asset_name)
    }

    /// See [`ResourceLoader::binary_length`]
    pub fn binary_length(&self, binary_asset_name: &str) -> Result<u32> {
        self.loader
            .binary_length(self.session.storage(), binary_asset_name)
    }

    /// See [`ResourceLoader::load_binary`]
    pub fn load_binary(&mut self, binary_asset_name: &str) -> Result<Vec<u8>> {
        self.loader
            .load_binary(self.session.storage_mut(), binary_asset_name)
    }

    /// See [`ResourceLoader::load_binary_from_file_system`]
    pub fn load_binary_from_file_system(&mut self, binary_asset_name: &str) -> Result<Vec<u8>> {
        self.loader
            .load_binary_from_file_system(self.session.storage_mut(), binary_asset_name)
    }

    /// See [`ResourceLoader::load_binary_segment_from_file_system`]
    pub fn load_binary_segment_from_file_system(
        &mut self,
        binary_asset_name: &str,
        offset: u32,
        length: u32,
    ) -> Result<Vec<u8>> {
        self.loader.load_binary_segment_from_file_system(
            self.session.storage_mut(),
            binary_asset_name,
            offset,
            length,
        )
    }

    /// Advance the session, then the loader
    pub fn update(&mut self, elapsed: Duration) -> Result<()> {
        self.session.update()?;
        self.loader.update(self.session.storage_mut(), elapsed)
    }

    /// Next storage event, if any
    pub fn poll_storage_event(&mut self) -> Option<StorageEvent> {
        self.session.poll_event()
    }

    /// Next load event, if any
    pub fn poll_load_event(&mut self) -> Option<LoadEvent<A>> {
        self.loader.poll_event()
    }
}
