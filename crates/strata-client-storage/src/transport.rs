//! Download transport seam
//!
//! The engine never talks to the network itself. It submits downloads to a
//! [`Transport`] and drains [`TransportEvent`]s on the next tick. Every event
//! carries back the [`DownloadTag`] given at submission, which is how the
//! updater and the version list processor recover their own bookkeeping.

use crate::Result;
use std::path::{Path, PathBuf};
use strata_crypto::ResourceHash;
use strata_formats::ResourceName;

/// Identifier the transport assigns to a submitted download
pub type DownloadId = u64;

/// Caller data attached to a download
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DownloadTag {
    /// Remote manifest with the given plain hash
    VersionList(ResourceHash),
    /// Resource download
    Resource(ResourceName),
}

/// Progress and completion reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Transfer started; `current_length` is non-zero when resuming
    Start {
        /// Download identifier
        id: DownloadId,
        /// Caller data
        tag: DownloadTag,
        /// Destination path
        path: PathBuf,
        /// Source URI
        uri: String,
        /// Bytes already on disk
        current_length: u64,
    },
    /// More bytes arrived
    Update {
        /// Download identifier
        id: DownloadId,
        /// Caller data
        tag: DownloadTag,
        /// Bytes on disk so far
        current_length: u64,
    },
    /// Transfer finished; the file at `path` is complete
    Success {
        /// Download identifier
        id: DownloadId,
        /// Caller data
        tag: DownloadTag,
        /// Destination path
        path: PathBuf,
        /// Final length
        length: u64,
    },
    /// Transfer failed
    Failure {
        /// Download identifier
        id: DownloadId,
        /// Caller data
        tag: DownloadTag,
        /// Destination path
        path: PathBuf,
        /// Failure reason
        message: String,
    },
}

impl TransportEvent {
    /// Download identifier of any event
    pub fn id(&self) -> DownloadId {
        match self {
            Self::Start { id, .. }
            | Self::Update { id, .. }
            | Self::Success { id, .. }
            | Self::Failure { id, .. } => *id,
        }
    }

    /// Caller data of any event
    pub fn tag(&self) -> &DownloadTag {
        match self {
            Self::Start { tag, .. }
            | Self::Update { tag, .. }
            | Self::Success { tag, .. }
            | Self::Failure { tag, .. } => tag,
        }
    }
}

/// Bounded-concurrency download manager
pub trait Transport {
    /// Queue a download of `uri` into `path`
    fn add_download(&mut self, path: &Path, uri: &str, tag: DownloadTag) -> Result<DownloadId>;

    /// Drop a queued or running download; false when unknown
    fn remove_download(&mut self, id: DownloadId) -> bool;

    /// Agents currently idle
    fn free_agent_count(&self) -> usize;

    /// Downloads accepted but not yet started
    fn waiting_task_count(&self) -> usize;

    /// Next pending event, if any
    fn poll_event(&mut self) -> Option<TransportEvent>;
}
