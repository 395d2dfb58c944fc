//! Load agents and the state they share
//!
//! An agent takes a task through read, parse and extract. Starting is a
//! decision: an already pooled asset finishes at once, a task whose
//! dependencies or resource are still in flight waits, anything else begins
//! the pipeline on the agent's helper.

use crate::error::{LoadStatus, LoaderError, Result};
use crate::events::LoadEvent;
use crate::helper::{Decryptor, HelperEvent, LoadAgentHelper, ReadSource};
use crate::pool::ObjectPool;
use crate::task::{DependencyLink, LoadTask, TaskKind};
use crate::task_pool::{StartTaskStatus, Task, TaskAgent};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use strata_client_storage::{ResourceInfo, ResourceStorage, StorageError};
use strata_formats::ResourceName;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

/// Pool key of a resource
pub(crate) fn resource_key(name: &ResourceName) -> String {
    name.full_name()
}

/// Loaded container plus the resources its assets depend on
#[derive(Debug)]
pub(crate) struct ResourceObject<C> {
    pub container: Arc<C>,
    pub dependency_resources: BTreeSet<String>,
}

/// Extracted asset plus what it holds
#[derive(Debug)]
pub(crate) struct AssetObject<A> {
    pub asset: Arc<A>,
    pub resource_key: String,
    pub dependency_asset_names: Vec<String>,
}

/// Active scene plus what it holds
#[derive(Debug)]
pub(crate) struct SceneObject {
    pub resource_key: String,
    pub dependency_asset_names: Vec<String>,
}

/// Pools, in-flight names and dependency links of one loader
pub(crate) struct LoaderState<C, A> {
    pub asset_pool: ObjectPool<AssetObject<A>>,
    pub resource_pool: ObjectPool<ResourceObject<C>>,
    pub loading_assets: HashSet<String>,
    pub loading_resources: HashSet<String>,
    pub links: HashMap<u64, DependencyLink>,
    pub scenes: HashMap<String, SceneObject>,
    pub pending_scenes: HashSet<String>,
    pub failed_parents: Vec<(u64, String)>,
    pub decryptor: Box<dyn Decryptor>,
    pub fatal: Option<LoaderError>,
    events: UnboundedSender<LoadEvent<A>>,
}

impl<C, A> LoaderState<C, A> {
    pub fn new(
        asset_pool: ObjectPool<AssetObject<A>>,
        resource_pool: ObjectPool<ResourceObject<C>>,
        decryptor: Box<dyn Decryptor>,
        events: UnboundedSender<LoadEvent<A>>,
    ) -> Self {
        Self {
            asset_pool,
            resource_pool,
            loading_assets: HashSet::new(),
            loading_resources: HashSet::new(),
            links: HashMap::new(),
            scenes: HashMap::new(),
            pending_scenes: HashSet::new(),
            failed_parents: Vec::new(),
            decryptor,
            fatal: None,
            events,
        }
    }

    pub fn emit(&self, event: LoadEvent<A>) {
        // The receiver lives as long as the loader
        let _ = self.events.send(event);
    }

    /// Keep the first internal error for the host to see on the next update
    pub fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            error!("Loader invariant violated: {}", e);
            if self.fatal.is_none() {
                self.fatal = Some(e);
            }
        }
    }

    /// Give back one hold on `asset_name` and on everything it holds
    pub fn unspawn_asset(&mut self, asset_name: &str) -> Result<()> {
        self.asset_pool.unspawn(asset_name)?;
        let dependencies = self
            .asset_pool
            .get(asset_name)
            .map(|object| object.dependency_asset_names.clone())
            .unwrap_or_default();
        for dependency in &dependencies {
            self.unspawn_asset(dependency)?;
        }
        Ok(())
    }

    /// Dependencies collected for `serial_id`, consuming its link
    pub fn take_link(&mut self, serial_id: u64) -> Vec<String> {
        self.links
            .remove(&serial_id)
            .map(|link| link.loaded)
            .unwrap_or_default()
    }

    /// Mark `task` finished without an object and report it
    pub fn fail_task(&mut self, task: &mut LoadTask, status: LoadStatus, message: String) {
        task.done = true;
        warn!("Failed to load '{}' ({}): {}", task.asset_name(), status, message);

        let result = self.abandon_link(task.serial_id());
        self.record(result);
        match task.kind() {
            TaskKind::LoadDependencyAsset { parent } => {
                let message = format!(
                    "cannot load dependency asset '{}': {}",
                    task.asset_name(),
                    message
                );
                self.child_failed(parent, message);
            }
            TaskKind::LoadScene => {
                self.pending_scenes.remove(task.asset_name());
                self.emit_failure(task, status, message);
            }
            TaskKind::LoadAsset => self.emit_failure(task, status, message),
        }
    }

    fn emit_failure(&self, task: &LoadTask, status: LoadStatus, message: String) {
        self.emit(LoadEvent::Failure {
            ticket: task.ticket(),
            asset_name: task.asset_name().to_string(),
            status,
            message,
        });
    }

    /// Drop the dependencies a failed task collected; later ones are dropped on arrival
    fn abandon_link(&mut self, serial_id: u64) -> Result<()> {
        let Some(link) = self.links.get_mut(&serial_id) else {
            return Ok(());
        };
        link.abandoned = true;
        let loaded = std::mem::take(&mut link.loaded);
        if link.outstanding == 0 {
            self.links.remove(&serial_id);
        }
        for dependency in &loaded {
            self.unspawn_asset(dependency)?;
        }
        Ok(())
    }

    fn child_failed(&mut self, parent: u64, message: String) {
        let Some(link) = self.links.get_mut(&parent) else {
            return;
        };
        link.outstanding = link.outstanding.saturating_sub(1);
        if link.abandoned {
            if link.outstanding == 0 {
                self.links.remove(&parent);
            }
        } else if link.failure.is_none() {
            link.failure = Some(message.clone());
            self.failed_parents.push((parent, message));
        }
    }

    pub fn child_succeeded(&mut self, parent: u64, asset_name: &str) -> Result<()> {
        let Some(link) = self.links.get_mut(&parent) else {
            return Err(LoaderError::Invariant(format!(
                "dependency '{asset_name}' finished for unknown task {parent}"
            )));
        };
        link.outstanding = link.outstanding.saturating_sub(1);
        if link.abandoned {
            if link.outstanding == 0 {
                self.links.remove(&parent);
            }
            return self.unspawn_asset(asset_name);
        }

        link.loaded.push(asset_name.to_string());
        if link.report {
            let event = LoadEvent::DependencyLoaded {
                ticket: link.ticket,
                asset_name: link.asset_name.clone(),
                dependency_asset_name: asset_name.to_string(),
                loaded_count: link.loaded.len(),
                total_count: link.total,
            };
            self.emit(event);
        }
        Ok(())
    }
}

/// What an agent works against
pub(crate) struct LoadContext<'a, C, A> {
    pub storage: &'a mut ResourceStorage,
    pub state: &'a mut LoaderState<C, A>,
}

/// Locate the bytes of `resource`
pub(crate) fn read_source(storage: &mut ResourceStorage, resource: &ResourceInfo) -> Result<ReadSource> {
    let path = resource.storage_path(&storage.config)?;
    if !resource.use_file_system() {
        return Ok(ReadSource::File(path));
    }
    let entry = resource.file_system_entry_name();
    let info = storage
        .resource_file_system(resource)?
        .file_info(&entry)
        .ok_or_else(|| {
            StorageError::NotFound(format!("'{}' in {}", entry, path.display()))
        })?;
    Ok(ReadSource::FileSystem {
        path,
        entry,
        offset: info.offset,
        length: info.length,
    })
}

/// Drives one task at a time through its helper
pub(crate) struct LoadAgent<C, A> {
    helper: Box<dyn LoadAgentHelper<C, A>>,
    resource: Option<ResourceInfo>,
    loading_asset: Option<String>,
    loading_resource: Option<String>,
    held_resource: Option<String>,
}

impl<C, A> LoadAgent<C, A> {
    pub fn new(helper: Box<dyn LoadAgentHelper<C, A>>) -> Self {
        Self {
            helper,
            resource: None,
            loading_asset: None,
            loading_resource: None,
            held_resource: None,
        }
    }

    fn begin(&mut self, task: &LoadTask, context: &mut LoadContext<'_, C, A>, resource: ResourceInfo) -> Result<()> {
        let key = resource_key(resource.name());
        context.state.loading_assets.insert(task.asset_name().to_string());
        self.loading_asset = Some(task.asset_name().to_string());

        if let Some(object) = context.state.resource_pool.spawn(&key) {
            let container = Arc::clone(&object.container);
            self.held_resource = Some(key);
            self.resource = Some(resource);
            return self.on_resource_ready(task, context, &container);
        }

        context.state.loading_resources.insert(key.clone());
        self.loading_resource = Some(key);
        let load_type = resource.load_type();
        if load_type.is_load_from_binary() {
            return Err(LoaderError::rejected(
                task.asset_name(),
                LoadStatus::TypeError,
                "resource is a binary",
            ));
        }
        let source = read_source(context.storage, &resource)?;
        self.resource = Some(resource);

        let started = if load_type.is_load_from_memory() {
            self.helper.read_bytes(&source)
        } else {
            self.helper.read_file(&source)
        };
        debug!("Reading {:?} for '{}'", source, task.asset_name());
        started.map_err(|m| LoaderError::rejected(task.asset_name(), LoadStatus::AssetError, m))
    }

    fn on_container(&mut self, task: &LoadTask, context: &mut LoadContext<'_, C, A>, container: C) -> Result<()> {
        let key = self.loading_resource.take().ok_or_else(|| {
            LoaderError::Invariant(format!("container arrived for '{}' without a read", task.asset_name()))
        })?;
        context.state.loading_resources.remove(&key);
        let object = ResourceObject {
            container: Arc::new(container),
            dependency_resources: BTreeSet::new(),
        };
        let container = Arc::clone(&context.state.resource_pool.register(key.clone(), object, true)?.container);
        self.held_resource = Some(key);
        self.on_resource_ready(task, context, &container)
    }

    fn on_resource_ready(&mut self, task: &LoadTask, context: &mut LoadContext<'_, C, A>, container: &C) -> Result<()> {
        let key = self.held_resource.clone().unwrap_or_default();
        let state = &mut *context.state;
        for dependency in task.dependency_asset_names() {
            let dependency_resource = state
                .asset_pool
                .get(dependency)
                .map(|object| object.resource_key.clone())
                .ok_or_else(|| {
                    LoaderError::Invariant(format!("dependency asset '{dependency}' is not pooled"))
                })?;
            if dependency_resource == key {
                continue;
            }
            let inserted = state
                .resource_pool
                .get_mut(&key)
                .ok_or_else(|| LoaderError::Invariant(format!("resource '{key}' is not pooled")))?
                .dependency_resources
                .insert(dependency_resource.clone());
            if inserted {
                state.resource_pool.add_dependency(&dependency_resource)?;
            }
        }

        let started = if task.is_scene() {
            self.helper.load_scene(container, task.asset_name())
        } else {
            self.helper.load_asset(container, task.asset_name())
        };
        started.map_err(|m| LoaderError::rejected(task.asset_name(), LoadStatus::AssetError, m))
    }

    fn on_bytes(&mut self, task: &LoadTask, context: &LoadContext<'_, C, A>, mut bytes: Vec<u8>) -> Result<()> {
        if let Some(resource) = &self.resource {
            context.state.decryptor.decrypt(resource, &mut bytes, 0);
        }
        self.helper
            .parse_bytes(bytes)
            .map_err(|m| LoaderError::rejected(task.asset_name(), LoadStatus::AssetError, m))
    }

    fn on_asset_loaded(&mut self, task: &mut LoadTask, context: &mut LoadContext<'_, C, A>, asset: A) -> Result<()> {
        let resource_key = self.held_resource.take().ok_or_else(|| {
            LoaderError::Invariant(format!("asset '{}' arrived without its resource", task.asset_name()))
        })?;
        let state = &mut *context.state;
        let dependency_asset_names = state.take_link(task.serial_id());
        for dependency in &dependency_asset_names {
            state.asset_pool.add_dependency(dependency)?;
        }
        let object = AssetObject {
            asset: Arc::new(asset),
            resource_key,
            dependency_asset_names,
        };
        let asset = Arc::clone(&state.asset_pool.register(task.asset_name(), object, true)?.asset);
        self.release_loading_asset(state);
        self.finish_asset(task, state, asset)
    }

    fn on_scene_loaded(&mut self, task: &mut LoadTask, context: &mut LoadContext<'_, C, A>) -> Result<()> {
        let resource_key = self.held_resource.take().ok_or_else(|| {
            LoaderError::Invariant(format!("scene '{}' arrived without its resource", task.asset_name()))
        })?;
        let state = &mut *context.state;
        let dependency_asset_names = state.take_link(task.serial_id());
        state.scenes.insert(
            task.asset_name().to_string(),
            SceneObject {
                resource_key,
                dependency_asset_names,
            },
        );
        state.pending_scenes.remove(task.asset_name());
        self.release_loading_asset(state);

        self.helper.reset();
        task.done = true;
        state.emit(LoadEvent::SceneSuccess {
            ticket: task.ticket(),
            scene_asset_name: task.asset_name().to_string(),
            duration: task.created_at().elapsed(),
        });
        Ok(())
    }

    fn finish_asset(&mut self, task: &mut LoadTask, state: &mut LoaderState<C, A>, asset: Arc<A>) -> Result<()> {
        self.helper.reset();
        task.done = true;
        match task.kind() {
            TaskKind::LoadDependencyAsset { parent } => state.child_succeeded(parent, task.asset_name()),
            _ => {
                state.emit(LoadEvent::AssetSuccess {
                    ticket: task.ticket(),
                    asset_name: task.asset_name().to_string(),
                    asset,
                    duration: task.created_at().elapsed(),
                });
                Ok(())
            }
        }
    }

    fn release_loading_asset(&mut self, state: &mut LoaderState<C, A>) {
        if let Some(name) = self.loading_asset.take() {
            state.loading_assets.remove(&name);
        }
    }

    fn fail(task: &mut LoadTask, state: &mut LoaderState<C, A>, error: LoaderError) {
        let status = error.status().unwrap_or(LoadStatus::AssetError);
        let message = match &error {
            LoaderError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        };
        if matches!(error, LoaderError::Invariant(_)) {
            state.record(Err(error));
        }
        state.fail_task(task, status, message);
    }
}

impl<'a, C, A> TaskAgent<LoadContext<'a, C, A>> for LoadAgent<C, A> {
    type Task = LoadTask;

    fn start(&mut self, task: &mut LoadTask, context: &mut LoadContext<'a, C, A>) -> StartTaskStatus {
        let Some(resource) = context.storage.directory.resource(task.resource_name()).cloned() else {
            let error = LoaderError::rejected(task.asset_name(), LoadStatus::NotExist, "resource is unknown");
            Self::fail(task, context.state, error);
            return StartTaskStatus::UnknownError;
        };
        if !resource.is_ready() || context.state.loading_assets.contains(task.asset_name()) {
            return StartTaskStatus::HasToWait;
        }

        if let Some(link) = context.state.links.get(&task.serial_id()) {
            if let Some(message) = link.failure.clone() {
                let error = LoaderError::rejected(task.asset_name(), LoadStatus::DependencyError, message);
                Self::fail(task, context.state, error);
                return StartTaskStatus::UnknownError;
            }
            if link.outstanding > 0 {
                return StartTaskStatus::HasToWait;
            }
        }

        if !task.is_scene()
            && let Some(object) = context.state.asset_pool.spawn(task.asset_name())
        {
            let asset = Arc::clone(&object.asset);
            context.state.take_link(task.serial_id());
            let result = self.finish_asset(task, context.state, asset);
            context.state.record(result);
            return StartTaskStatus::Done;
        }

        let waiting_on_dependency = task
            .dependency_asset_names()
            .iter()
            .any(|d| !context.state.asset_pool.can_spawn(d));
        if waiting_on_dependency
            || context.state.loading_resources.contains(&resource_key(resource.name()))
        {
            return StartTaskStatus::HasToWait;
        }

        match self.begin(task, context, resource) {
            Ok(()) => StartTaskStatus::CanResume,
            Err(error) => {
                Self::fail(task, context.state, error);
                StartTaskStatus::UnknownError
            }
        }
    }

    fn update(&mut self, task: &mut LoadTask, context: &mut LoadContext<'a, C, A>, _elapsed: Duration) {
        while !task.is_done() {
            let Some(event) = self.helper.poll() else {
                break;
            };
            let result = match event {
                HelperEvent::Progress { stage, progress } => {
                    if !matches!(task.kind(), TaskKind::LoadDependencyAsset { .. }) {
                        context.state.emit(LoadEvent::Progress {
                            ticket: task.ticket(),
                            asset_name: task.asset_name().to_string(),
                            stage,
                            progress,
                        });
                    }
                    Ok(())
                }
                HelperEvent::ReadFileComplete(container) | HelperEvent::ParseBytesComplete(container) => {
                    self.on_container(task, context, container)
                }
                HelperEvent::ReadBytesComplete(bytes) => self.on_bytes(task, context, bytes),
                HelperEvent::LoadAssetComplete(asset) => self.on_asset_loaded(task, context, asset),
                HelperEvent::LoadSceneComplete => self.on_scene_loaded(task, context),
                HelperEvent::Error { status, message } => {
                    Err(LoaderError::rejected(task.asset_name(), status, message))
                }
            };
            if let Err(error) = result {
                if task.is_done() {
                    context.state.record(Err(error));
                } else {
                    Self::fail(task, context.state, error);
                }
            }
        }
    }

    fn reset(&mut self, context: &mut LoadContext<'a, C, A>) {
        self.helper.reset();
        self.release_loading_asset(context.state);
        if let Some(key) = self.loading_resource.take() {
            context.state.loading_resources.remove(&key);
        }
        if let Some(key) = self.held_resource.take() {
            let result = context.state.resource_pool.unspawn(&key);
            context.state.record(result);
        }
        self.resource = None;
    }
}
