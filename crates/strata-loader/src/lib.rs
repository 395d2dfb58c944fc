//! Asset loading for strata
//!
//! The loader turns verified resources into engine objects. It knows which
//! resource holds which asset and what each asset depends on; it does not
//! know how to parse a container. That is the engine's job, plugged in
//! through a [`ResourceHelper`].
//!
//! Loaded objects are pooled and shared:
//!
//! - **Assets** are handed out as `Arc<A>`. Every `load_asset` that succeeds
//!   takes one hold, every `unload_asset` gives it back, recursively through
//!   the asset's dependencies.
//! - **Resources** stay pooled while any asset extracted from them, or any
//!   resource whose assets depend on them, is alive.
//!
//! An object is released only when nothing holds it and nothing depends on
//! it: either by an explicit release call or by the periodic sweep in
//! [`ResourceLoader::update`], which drops expired objects and keeps the
//! pools under capacity.
//!
//! Like the storage session, the loader never blocks and never spawns
//! threads. Load requests return a [`LoadTicket`] and their outcome arrives
//! as a [`LoadEvent`] on a later tick.
//!
//! # Example
//!
//! ```no_run
//! # use strata_loader::*;
//! # fn demo(mut manager: ResourceManager<Vec<u8>, String>) -> Result<()> {
//! let ticket = manager.load_asset("ui/title.png", 0)?;
//! loop {
//!     manager.update(std::time::Duration::from_millis(16))?;
//!     if let Some(event) = manager.poll_load_event()
//!         && event.ticket() == ticket
//!         && event.is_terminal()
//!     {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

// Loader configuration
pub mod config;

// Errors and load outcome reasons
pub mod error;

// Events reported to the host
pub mod events;

// Engine seams
pub mod helper;

// Use- and dependency-counted object pool
pub mod pool;

// Agent-bounded task scheduling
pub mod task_pool;

// Load tasks
pub mod task;

mod agent;
mod loader;
mod manager;

pub use config::{LoaderConfig, PoolConfig};
pub use error::{LoadStatus, LoaderError, Result};
pub use events::{LoadEvent, LoadTicket};
pub use helper::{
    Decryptor, HashXorDecryptor, HelperEvent, LoadAgentHelper, LoadStage, ReadSource,
    ResourceHelper,
};
pub use loader::{BinaryLocation, HasAssetResult, ResourceLoader};
pub use manager::ResourceManager;
pub use pool::ObjectPool;
pub use task::{LoadTask, TaskKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
