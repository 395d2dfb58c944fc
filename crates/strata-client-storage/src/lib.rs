//! Client-side resource storage for strata
//!
//! This crate keeps a client install consistent with the manifest published
//! by the update server. It reconciles three sources of truth:
//!
//! - **Updatable list**: the remote manifest, downloaded and verified by the
//!   [`VersionListProcessor`]
//! - **Read-only list**: what the build shipped in the read-only path
//! - **Read-write list**: what earlier sessions downloaded and verified
//!
//! The [`ResourceChecker`] merges them into one status per resource. The
//! [`ResourceUpdater`] downloads or extracts from resource packs whatever is
//! missing, verifies it, and marks it ready in the [`ResourceDirectory`].
//! Package builds skip all of that and use the [`ResourceIniter`].
//!
//! All work is driven by [`StorageSession::update`] from a host tick. Nothing
//! blocks and nothing spawns threads: downloads are submitted to a
//! [`Transport`] and their events are drained on the next tick.
//!
//! # Storage Layout
//!
//! ```text
//! <read-only>/ResourceList.dat          local list of shipped resources
//! <read-only>/PackageList.dat           package list (package mode)
//! <read-only>/<fs>.dat                  shipped file system containers
//! <read-write>/ResourceVersion.<crc>.dat remote manifest, decompressed
//! <read-write>/ResourceList.dat         local list of verified downloads
//! <read-write>/ResourceList.dat.bak     present only during regeneration
//! <read-write>/ResourceList.dat.tmp     new list before it replaces the primary
//! <read-write>/<name>[.<variant>].<ext> loose resources
//! <read-write>/<fs>.dat                 file system containers
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use thiserror::Error;

// Configuration
pub mod config;

// Session state shared by checker, updater and loader
pub mod directory;

// File system containers
pub mod file_system;

// Download transport seam
pub mod transport;

// Events reported to the host
pub mod events;

// Crash-safe read-write list regeneration
pub mod read_write_list;

// Manifest reconciliation
pub mod checker;

// Remote manifest bootstrap
pub mod version_list_processor;

// Download and apply pipeline
pub mod updater;

// Package mode
pub mod initer;

// Tick-driven session
mod session;

pub use checker::{CheckInfo, CheckStatus, CheckSummary, ResourceChecker};
pub use config::StorageConfig;
pub use directory::{
    AssetInfo, ReadWriteResourceInfo, ResourceDirectory, ResourceGroup, ResourceInfo, ResourceStorage,
};
pub use events::{BatchResult, EventSink, StorageEvent};
pub use file_system::{FileSystemManager, FileSystemStore};
pub use initer::ResourceIniter;
pub use session::StorageSession;
pub use transport::{DownloadId, DownloadTag, Transport, TransportEvent};
pub use updater::{CancelPredicate, ResourceUpdater, UpdateInfo};
pub use version_list_processor::{CheckVersionListResult, VersionListProcessor, VersionPointer};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Host setup is incomplete.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Length or hash mismatch.
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Internal bookkeeping went wrong.
    #[error("Internal consistency violation: {0}")]
    Invariant(String),

    /// Operation not allowed in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource, asset or group not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport rejected a request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// File system container error.
    #[error("File system error: {0}")]
    FileSystem(#[from] strata_formats::filesystem::FileSystemError),

    /// Manifest could not be parsed or built.
    #[error("Version list error: {0}")]
    VersionList(#[from] strata_formats::version_list::VersionListError),

    /// Zlib stream error.
    #[error("Compression error: {0}")]
    Compression(#[from] strata_formats::compression::CompressionError),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Version information for the storage system.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local list file name, in both the read-only and read-write paths.
pub const LOCAL_VERSION_LIST_FILE_NAME: &str = "ResourceList.dat";

/// Package list file name in the read-only path.
pub const PACKAGE_VERSION_LIST_FILE_NAME: &str = "PackageList.dat";

/// Base name of the remote manifest; the file carries a CRC suffix.
pub const REMOTE_VERSION_LIST_FILE_NAME: &str = "ResourceVersion";

/// Extension of every manifest, container and remote resource.
pub const DEFAULT_EXTENSION: &str = "dat";

/// Extension of the read-write list backup.
pub const BACKUP_EXTENSION: &str = "bak";

/// Extension of the read-write list while it is being written.
pub const TEMP_EXTENSION: &str = "tmp";
