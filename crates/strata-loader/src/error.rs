//! Loader errors and load outcome reasons

use strata_client_storage::StorageError;
use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Why a load did not produce an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    /// Asset or resource unknown to the directory
    NotExist,
    /// Resource known but not yet verified on disk
    NotReady,
    /// A dependency asset could not be loaded
    DependencyError,
    /// Binary requested as an asset or the other way round
    TypeError,
    /// Container read, parse or extraction failed
    AssetError,
}

impl std::fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NotExist => "not exist",
            Self::NotReady => "not ready",
            Self::DependencyError => "dependency error",
            Self::TypeError => "type error",
            Self::AssetError => "asset error",
        };
        f.write_str(text)
    }
}

/// Errors that can occur during loader operations
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Request refused before any task was queued
    #[error("Cannot load '{name}' ({status}): {message}")]
    Rejected {
        /// Asset or binary name
        name: String,
        /// Reason
        status: LoadStatus,
        /// Details
        message: String,
    },

    /// Host setup is incomplete
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Dependency or use counts went wrong
    #[error("Internal consistency violation: {0}")]
    Invariant(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    pub(crate) fn rejected(name: &str, status: LoadStatus, message: impl Into<String>) -> Self {
        Self::Rejected {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }

    /// Reason when the request was refused up front
    pub fn status(&self) -> Option<LoadStatus> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
