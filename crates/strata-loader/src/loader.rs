//! Dependency-aware load scheduling
//!
//! Requests are checked against the resource directory before anything is
//! queued: the asset and its resource must exist and be ready, and every
//! dependency must pass the same check, recursively. A request that passes
//! becomes one task per asset in its dependency tree, dependencies first, all
//! sharing the request's ticket.

use crate::agent::{
    AssetObject, LoadAgent, LoadContext, LoaderState, ResourceObject, resource_key,
};
use crate::config::LoaderConfig;
use crate::error::{LoadStatus, LoaderError, Result};
use crate::events::{LoadEvent, LoadTicket};
use crate::helper::{Decryptor, HashXorDecryptor, ResourceHelper};
use crate::pool::ObjectPool;
use crate::task::{DependencyLink, LoadTask, TaskKind};
use crate::task_pool::TaskPool;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use strata_client_storage::{ResourceDirectory, ResourceInfo, ResourceStorage};
use strata_formats::ResourceName;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

/// Whether and where an asset can be loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HasAssetResult {
    /// Unknown asset or resource
    NotExist,
    /// Known, not yet verified on disk
    NotReady,
    /// Asset in a loose file
    AssetOnDisk,
    /// Asset in a file system container
    AssetOnFileSystem,
    /// Binary in a loose file
    BinaryOnDisk,
    /// Binary in a file system container
    BinaryOnFileSystem,
}

/// Where a binary's bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryLocation {
    /// Loose file
    File(PathBuf),
    /// Entry inside a file system container
    FileSystem {
        /// Container path
        path: PathBuf,
        /// Entry name
        entry: String,
    },
}

/// Builds the tasks of one request, depth first
struct Planner<'a> {
    directory: &'a ResourceDirectory,
    ticket: LoadTicket,
    priority: i32,
    next_serial_id: &'a mut u64,
    visiting: Vec<String>,
    tasks: Vec<LoadTask>,
    links: Vec<(u64, DependencyLink)>,
}

impl Planner<'_> {
    fn visit(&mut self, asset_name: &str, kind: TaskKind) -> Result<()> {
        if self.visiting.iter().any(|name| name == asset_name) {
            let mut chain = self.visiting.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(asset_name);
            return Err(LoaderError::rejected(
                asset_name,
                LoadStatus::DependencyError,
                format!("circular dependency {chain}"),
            ));
        }

        let asset = self.directory.asset(asset_name).ok_or_else(|| {
            LoaderError::rejected(asset_name, LoadStatus::NotExist, "asset is unknown")
        })?;
        let resource = self.directory.resource(asset.resource_name()).ok_or_else(|| {
            LoaderError::rejected(
                asset_name,
                LoadStatus::NotExist,
                format!("resource '{}' is unknown", asset.resource_name().full_name()),
            )
        })?;
        if resource.is_load_from_binary() {
            return Err(LoaderError::rejected(
                asset_name,
                LoadStatus::TypeError,
                "resource is a binary; use load_binary",
            ));
        }
        if !resource.is_ready() {
            return Err(LoaderError::rejected(
                asset_name,
                LoadStatus::NotReady,
                format!("resource '{}' is not ready", resource.name().full_name()),
            ));
        }

        let serial_id = *self.next_serial_id;
        *self.next_serial_id += 1;
        let dependencies = asset.dependency_asset_names().to_vec();

        self.visiting.push(asset_name.to_string());
        for dependency in &dependencies {
            self.visit(dependency, TaskKind::LoadDependencyAsset { parent: serial_id })
                .map_err(|e| {
                    LoaderError::rejected(
                        asset_name,
                        LoadStatus::DependencyError,
                        format!("cannot load dependency asset '{dependency}': {e}"),
                    )
                })?;
        }
        self.visiting.pop();

        if !dependencies.is_empty() {
            let report = !matches!(kind, TaskKind::LoadDependencyAsset { .. });
            self.links.push((
                serial_id,
                DependencyLink::new(self.ticket, asset_name, dependencies.len(), report),
            ));
        }
        self.tasks.push(LoadTask::new(
            serial_id,
            self.ticket,
            self.priority,
            asset_name,
            resource.name().clone(),
            dependencies,
            kind,
        ));
        Ok(())
    }
}

/// Loads assets, scenes and binaries out of verified resources
pub struct ResourceLoader<C, A> {
    helper: Box<dyn ResourceHelper<C, A>>,
    task_pool: TaskPool<LoadAgent<C, A>, LoadTask>,
    state: LoaderState<C, A>,
    events: UnboundedReceiver<LoadEvent<A>>,
    next_serial_id: u64,
    next_ticket: LoadTicket,
}

impl<C, A> ResourceLoader<C, A> {
    /// Loader with one agent helper per configured load agent
    pub fn new(config: &LoaderConfig, mut helper: Box<dyn ResourceHelper<C, A>>) -> Result<Self> {
        config.validate()?;
        let (sender, events) = mpsc::unbounded_channel();
        let mut task_pool = TaskPool::new();
        for _ in 0..config.load_agent_count {
            task_pool.add_agent(LoadAgent::new(helper.create_agent_helper()));
        }
        info!("Resource loader with {} load agents", config.load_agent_count);

        Ok(Self {
            helper,
            task_pool,
            state: LoaderState::new(
                ObjectPool::new("asset", &config.asset_pool),
                ObjectPool::new("resource", &config.resource_pool),
                Box::new(HashXorDecryptor),
                sender,
            ),
            events,
            next_serial_id: 1,
            next_ticket: 1,
        })
    }

    /// Replace the decryptor applied to memory-loaded resources and binaries
    pub fn set_decryptor(&mut self, decryptor: Box<dyn Decryptor>) {
        self.state.decryptor = decryptor;
    }

    /// Number of load agents
    pub fn total_agent_count(&self) -> usize {
        self.task_pool.total_agent_count()
    }

    /// Number of idle load agents
    pub fn free_agent_count(&self) -> usize {
        self.task_pool.free_agent_count()
    }

    /// Number of agents working on a task
    pub fn working_agent_count(&self) -> usize {
        self.task_pool.working_agent_count()
    }

    /// Number of queued tasks
    pub fn waiting_task_count(&self) -> usize {
        self.task_pool.waiting_task_count()
    }

    /// Pooled assets
    pub fn asset_count(&self) -> usize {
        self.state.asset_pool.count()
    }

    /// Pooled resources
    pub fn resource_count(&self) -> usize {
        self.state.resource_pool.count()
    }

    /// Pooled asset without taking a hold
    pub fn pooled_asset(&self, asset_name: &str) -> Option<&std::sync::Arc<A>> {
        self.state.asset_pool.get(asset_name).map(|object| &object.asset)
    }

    /// Current holders of a pooled asset
    pub fn asset_spawn_count(&self, asset_name: &str) -> Option<usize> {
        self.state.asset_pool.spawn_count(asset_name)
    }

    /// Pooled assets depending on a pooled asset
    pub fn asset_dependency_count(&self, asset_name: &str) -> Option<usize> {
        self.state.asset_pool.dependency_count(asset_name)
    }

    /// Current holders of a pooled resource
    pub fn resource_spawn_count(&self, name: &ResourceName) -> Option<usize> {
        self.state.resource_pool.spawn_count(&resource_key(name))
    }

    /// Pooled resources depending on a pooled resource
    pub fn resource_dependency_count(&self, name: &ResourceName) -> Option<usize> {
        self.state.resource_pool.dependency_count(&resource_key(name))
    }

    /// Whether `scene_asset_name` is active
    pub fn is_scene_loaded(&self, scene_asset_name: &str) -> bool {
        self.state.scenes.contains_key(scene_asset_name)
    }

    /// Where `asset_name` could be loaded from right now
    pub fn has_asset(&self, storage: &ResourceStorage, asset_name: &str) -> HasAssetResult {
        let Some(resource) = storage.directory.resource_of_asset(asset_name) else {
            return HasAssetResult::NotExist;
        };
        if !resource.is_ready() {
            return HasAssetResult::NotReady;
        }
        match (resource.is_load_from_binary(), resource.use_file_system()) {
            (false, false) => HasAssetResult::AssetOnDisk,
            (false, true) => HasAssetResult::AssetOnFileSystem,
            (true, false) => HasAssetResult::BinaryOnDisk,
            (true, true) => HasAssetResult::BinaryOnFileSystem,
        }
    }

    /// Queue `asset_name` and its dependencies
    pub fn load_asset(
        &mut self,
        storage: &ResourceStorage,
        asset_name: &str,
        priority: i32,
    ) -> Result<LoadTicket> {
        self.schedule(storage, asset_name, priority, TaskKind::LoadAsset)
    }

    /// Queue the scene `scene_asset_name` and its dependencies
    pub fn load_scene(
        &mut self,
        storage: &ResourceStorage,
        scene_asset_name: &str,
        priority: i32,
    ) -> Result<LoadTicket> {
        if self.state.scenes.contains_key(scene_asset_name)
            || self.state.pending_scenes.contains(scene_asset_name)
        {
            return Err(LoaderError::InvalidState(format!(
                "scene '{scene_asset_name}' is already loaded or loading"
            )));
        }
        let ticket = self.schedule(storage, scene_asset_name, priority, TaskKind::LoadScene)?;
        self.state.pending_scenes.insert(scene_asset_name.to_string());
        Ok(ticket)
    }

    fn schedule(
        &mut self,
        storage: &ResourceStorage,
        asset_name: &str,
        priority: i32,
        kind: TaskKind,
    ) -> Result<LoadTicket> {
        let ticket = self.next_ticket;
        let mut planner = Planner {
            directory: &storage.directory,
            ticket,
            priority,
            next_serial_id: &mut self.next_serial_id,
            visiting: Vec::new(),
            tasks: Vec::new(),
            links: Vec::new(),
        };
        planner.visit(asset_name, kind)?;
        let Planner { tasks, links, .. } = planner;

        self.next_ticket += 1;
        debug!(
            "Ticket {} for '{}': {} tasks",
            ticket,
            asset_name,
            tasks.len()
        );
        self.state.links.extend(links);
        for task in tasks {
            self.task_pool.add_task(task);
        }
        Ok(ticket)
    }

    /// Give back one hold on `asset_name` and on its dependencies
    pub fn unload_asset(&mut self, asset_name: &str) -> Result<()> {
        match self.state.asset_pool.spawn_count(asset_name) {
            None => Err(LoaderError::InvalidState(format!(
                "asset '{asset_name}' is not loaded"
            ))),
            Some(0) => Err(LoaderError::InvalidState(format!(
                "asset '{asset_name}' has no holders"
            ))),
            Some(_) => self.state.unspawn_asset(asset_name),
        }
    }

    /// Deactivate a scene and give back what it held
    ///
    /// The engine side is best effort: a scene it cannot deactivate is still
    /// forgotten here.
    pub fn unload_scene(&mut self, scene_asset_name: &str) -> Result<()> {
        let scene = self.state.scenes.remove(scene_asset_name).ok_or_else(|| {
            LoaderError::InvalidState(format!("scene '{scene_asset_name}' is not loaded"))
        })?;
        if let Err(message) = self.helper.unload_scene(scene_asset_name) {
            warn!("Failed to unload scene '{}': {}", scene_asset_name, message);
        }
        for dependency in &scene.dependency_asset_names {
            self.state.unspawn_asset(dependency)?;
        }
        self.state.resource_pool.unspawn(&scene.resource_key)?;
        info!("Unloaded scene '{}'", scene_asset_name);
        Ok(())
    }

    /// Release `asset_name` if nothing holds or depends on it
    pub fn try_release_asset(&mut self, asset_name: &str) -> Result<bool> {
        match self.state.asset_pool.try_release(asset_name) {
            Some(object) => {
                self.release_asset_object(asset_name, &object)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Release the resource `name` if nothing holds or depends on it
    pub fn try_release_resource(&mut self, name: &ResourceName) -> Result<bool> {
        let key = resource_key(name);
        match self.state.resource_pool.try_release(&key) {
            Some(object) => {
                self.release_resource_object(&key, &object)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Release every unused pooled object, cascading through dependencies
    ///
    /// Returns the number of objects released.
    pub fn release_all_unused(&mut self) -> Result<usize> {
        let mut released = 0;
        loop {
            let now = Instant::now();
            let assets = self.state.asset_pool.release_unused(now, true);
            let asset_count = assets.len();
            for (name, object) in &assets {
                self.release_asset_object(name, object)?;
            }
            let resources = self.state.resource_pool.release_unused(now, true);
            let resource_count = resources.len();
            for (key, object) in &resources {
                self.release_resource_object(key, object)?;
            }
            if asset_count + resource_count == 0 {
                return Ok(released);
            }
            released += asset_count + resource_count;
        }
    }

    fn release_asset_object(&mut self, asset_name: &str, object: &AssetObject<A>) -> Result<()> {
        for dependency in &object.dependency_asset_names {
            self.state.asset_pool.remove_dependency(dependency)?;
        }
        self.state.resource_pool.unspawn(&object.resource_key)?;
        self.helper.release_asset(&object.asset);
        debug!("Released asset '{}'", asset_name);
        Ok(())
    }

    fn release_resource_object(&mut self, key: &str, object: &ResourceObject<C>) -> Result<()> {
        for dependency in &object.dependency_resources {
            self.state.resource_pool.remove_dependency(dependency)?;
        }
        self.helper.release_container(&object.container);
        debug!("Released resource '{}'", key);
        Ok(())
    }

    fn binary_resource<'s>(
        &self,
        storage: &'s ResourceStorage,
        binary_asset_name: &str,
    ) -> Result<&'s ResourceInfo> {
        let resource = storage
            .directory
            .resource_of_asset(binary_asset_name)
            .ok_or_else(|| {
                LoaderError::rejected(binary_asset_name, LoadStatus::NotExist, "binary is unknown")
            })?;
        if !resource.is_load_from_binary() {
            return Err(LoaderError::rejected(
                binary_asset_name,
                LoadStatus::TypeError,
                "resource is not a binary; use load_asset",
            ));
        }
        Ok(resource)
    }

    fn ready_binary_resource(
        &self,
        storage: &ResourceStorage,
        binary_asset_name: &str,
    ) -> Result<ResourceInfo> {
        let resource = self.binary_resource(storage, binary_asset_name)?;
        if !resource.is_ready() {
            return Err(LoaderError::rejected(
                binary_asset_name,
                LoadStatus::NotReady,
                format!("resource '{}' is not ready", resource.name().full_name()),
            ));
        }
        Ok(resource.clone())
    }

    /// Where the bytes of a binary live
    pub fn binary_path(&self, storage: &ResourceStorage, binary_asset_name: &str) -> Result<BinaryLocation> {
        let resource = self.ready_binary_resource(storage, binary_asset_name)?;
        let path = resource.storage_path(&storage.config)?;
        Ok(if resource.use_file_system() {
            BinaryLocation::FileSystem {
                path,
                entry: resource.file_system_entry_name(),
            }
        } else {
            BinaryLocation::File(path)
        })
    }

    /// Plain length of a binary
    pub fn binary_length(&self, storage: &ResourceStorage, binary_asset_name: &str) -> Result<u32> {
        Ok(self.ready_binary_resource(storage, binary_asset_name)?.length())
    }

    /// Read and decrypt a whole binary, wherever it is stored
    pub fn load_binary(&self, storage: &mut ResourceStorage, binary_asset_name: &str) -> Result<Vec<u8>> {
        let resource = self.ready_binary_resource(storage, binary_asset_name)?;
        let mut data = if resource.use_file_system() {
            read_entry(storage, &resource, binary_asset_name, None)?
        } else {
            fs::read(resource.storage_path(&storage.config)?)?
        };
        self.state.decryptor.decrypt(&resource, &mut data, 0);
        Ok(data)
    }

    /// Read and decrypt a whole binary stored in a file system container
    pub fn load_binary_from_file_system(
        &self,
        storage: &mut ResourceStorage,
        binary_asset_name: &str,
    ) -> Result<Vec<u8>> {
        let resource = self.file_system_binary(storage, binary_asset_name)?;
        let mut data = read_entry(storage, &resource, binary_asset_name, None)?;
        self.state.decryptor.decrypt(&resource, &mut data, 0);
        Ok(data)
    }

    /// Read and decrypt part of a binary stored in a file system container
    ///
    /// The range is clamped to the entry.
    pub fn load_binary_segment_from_file_system(
        &self,
        storage: &mut ResourceStorage,
        binary_asset_name: &str,
        offset: u32,
        length: u32,
    ) -> Result<Vec<u8>> {
        let resource = self.file_system_binary(storage, binary_asset_name)?;
        let mut data = read_entry(storage, &resource, binary_asset_name, Some((offset, length)))?;
        self.state
            .decryptor
            .decrypt(&resource, &mut data, u64::from(offset.min(resource.length())));
        Ok(data)
    }

    fn file_system_binary(&self, storage: &ResourceStorage, binary_asset_name: &str) -> Result<ResourceInfo> {
        let resource = self.ready_binary_resource(storage, binary_asset_name)?;
        if !resource.use_file_system() {
            return Err(LoaderError::rejected(
                binary_asset_name,
                LoadStatus::TypeError,
                "binary is not stored in a file system",
            ));
        }
        Ok(resource)
    }

    /// Advance every load agent by one tick and sweep the pools
    pub fn update(&mut self, storage: &mut ResourceStorage, elapsed: Duration) -> Result<()> {
        let mut context = LoadContext {
            storage,
            state: &mut self.state,
        };
        self.task_pool.update(&mut context, elapsed);

        loop {
            let failed = std::mem::take(&mut context.state.failed_parents);
            if failed.is_empty() {
                break;
            }
            for (serial_id, message) in failed {
                if let Some(mut task) = self.task_pool.remove_task(serial_id, &mut context) {
                    context
                        .state
                        .fail_task(&mut task, LoadStatus::DependencyError, message);
                }
            }
        }

        if let Some(error) = self.state.fatal.take() {
            return Err(error);
        }

        let now = Instant::now();
        let assets = self.state.asset_pool.update(elapsed, now);
        for (name, object) in &assets {
            self.release_asset_object(name, object)?;
        }
        let resources = self.state.resource_pool.update(elapsed, now);
        for (key, object) in &resources {
            self.release_resource_object(key, object)?;
        }
        Ok(())
    }

    /// Next event, if any
    pub fn poll_event(&mut self) -> Option<LoadEvent<A>> {
        self.events.try_recv().ok()
    }

    /// Drain every pending event
    pub fn drain_events(&mut self) -> Vec<LoadEvent<A>> {
        std::iter::from_fn(|| self.poll_event()).collect()
    }
}

fn read_entry(
    storage: &mut ResourceStorage,
    resource: &ResourceInfo,
    binary_asset_name: &str,
    segment: Option<(u32, u32)>,
) -> Result<Vec<u8>> {
    let entry = resource.file_system_entry_name();
    let store = storage.resource_file_system(resource)?;
    let data = match segment {
        Some((offset, length)) => store.read_file_segment(&entry, offset, length)?,
        None => store.read_file(&entry)?,
    };
    data.ok_or_else(|| {
        LoaderError::rejected(
            binary_asset_name,
            LoadStatus::NotExist,
            format!("'{}' is missing from {}", entry, store.path().display()),
        )
    })
}
