//! Load tasks

use crate::events::LoadTicket;
use crate::task_pool::Task;
use std::time::Instant;
use strata_formats::ResourceName;

/// What a task produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Asset requested by the host
    LoadAsset,
    /// Scene requested by the host
    LoadScene,
    /// Asset another task depends on
    LoadDependencyAsset {
        /// Task waiting for this one
        parent: u64,
    },
}

/// One scheduled load
#[derive(Debug)]
pub struct LoadTask {
    serial_id: u64,
    ticket: LoadTicket,
    priority: i32,
    created_at: Instant,
    asset_name: String,
    resource_name: ResourceName,
    dependency_asset_names: Vec<String>,
    kind: TaskKind,
    pub(crate) done: bool,
}

impl LoadTask {
    pub(crate) fn new(
        serial_id: u64,
        ticket: LoadTicket,
        priority: i32,
        asset_name: impl Into<String>,
        resource_name: ResourceName,
        dependency_asset_names: Vec<String>,
        kind: TaskKind,
    ) -> Self {
        Self {
            serial_id,
            ticket,
            priority,
            created_at: Instant::now(),
            asset_name: asset_name.into(),
            resource_name,
            dependency_asset_names,
            kind,
            done: false,
        }
    }

    /// Request the task serves
    pub fn ticket(&self) -> LoadTicket {
        self.ticket
    }

    /// When the request was accepted
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Asset or scene to load
    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    /// Resource holding the asset
    pub fn resource_name(&self) -> &ResourceName {
        &self.resource_name
    }

    /// Declared dependencies
    pub fn dependency_asset_names(&self) -> &[String] {
        &self.dependency_asset_names
    }

    /// Variant of the task
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Whether the task activates a scene
    pub fn is_scene(&self) -> bool {
        self.kind == TaskKind::LoadScene
    }
}

impl Task for LoadTask {
    fn serial_id(&self) -> u64 {
        self.serial_id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_done(&self) -> bool {
        self.done
    }
}

/// Dependency bookkeeping of a task with dependency tasks
#[derive(Debug)]
pub(crate) struct DependencyLink {
    pub ticket: LoadTicket,
    pub asset_name: String,
    pub total: usize,
    pub outstanding: usize,
    pub loaded: Vec<String>,
    pub failure: Option<String>,
    pub abandoned: bool,
    pub report: bool,
}

impl DependencyLink {
    pub fn new(ticket: LoadTicket, asset_name: &str, total: usize, report: bool) -> Self {
        Self {
            ticket,
            asset_name: asset_name.to_string(),
            total,
            outstanding: total,
            loaded: Vec::new(),
            failure: None,
            abandoned: false,
            report,
        }
    }
}
