//! Events reported to the host
//!
//! Components push [`StorageEvent`]s into an unbounded channel owned by the
//! session. For every resource attempt exactly one of success or failure is
//! sent, optionally preceded by start and progress events.

use crate::checker::CheckSummary;
use std::path::PathBuf;
use strata_formats::ResourceName;
use tokio::sync::mpsc::UnboundedSender;

/// Outcome of a whole batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchResult {
    /// No item of the batch ended in the failure state
    pub success: bool,
    /// The cancel predicate stopped the batch early
    pub cancelled: bool,
}

/// Everything the storage engine reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    /// Remote manifest downloaded, verified and in place
    VersionListUpdateSuccess {
        /// Final manifest path
        path: PathBuf,
        /// Source URI
        uri: String,
    },
    /// Remote manifest could not be fetched or verified
    VersionListUpdateFailure {
        /// Source URI
        uri: String,
        /// Failure reason
        message: String,
    },
    /// Reconciliation finished
    CheckComplete(CheckSummary),
    /// Reconciliation failed; the directory is left empty
    CheckFailure {
        /// Failure reason
        message: String,
    },
    /// Resource download started
    UpdateStart {
        /// Resource
        name: ResourceName,
        /// Download destination
        path: PathBuf,
        /// Source URI
        uri: String,
        /// Bytes already present
        current_length: u64,
        /// Served length
        compressed_length: u32,
        /// Retries used so far
        retry_count: u32,
    },
    /// Resource download progressed
    UpdateChanged {
        /// Resource
        name: ResourceName,
        /// Bytes received so far
        current_length: u64,
        /// Served length
        compressed_length: u32,
    },
    /// Resource verified and ready
    UpdateSuccess {
        /// Resource
        name: ResourceName,
        /// Where the verified bytes live
        path: PathBuf,
        /// Plain length
        length: u32,
        /// Served length
        compressed_length: u32,
    },
    /// Resource attempt failed
    UpdateFailure {
        /// Resource
        name: ResourceName,
        /// Source URI
        uri: String,
        /// Retries used, including this one
        retry_count: u32,
        /// Configured retry cap
        total_retry_count: u32,
        /// Failure reason
        message: String,
    },
    /// Queue drained for a group update
    UpdateComplete {
        /// Group name; empty for the default group
        group: String,
        /// Batch outcome
        result: BatchResult,
    },
    /// No candidate left at all
    UpdateAllComplete,
    /// Resource-pack entry extraction started
    ApplyStart {
        /// Resource pack path
        pack_path: PathBuf,
        /// Number of entries queued
        count: usize,
        /// Sum of their plain lengths
        total_length: u64,
    },
    /// Resource extracted from a pack, verified and ready
    ApplySuccess {
        /// Resource
        name: ResourceName,
        /// Where the verified bytes live
        path: PathBuf,
        /// Plain length
        length: u32,
        /// Length inside the pack
        compressed_length: u32,
    },
    /// Resource could not be extracted or verified
    ApplyFailure {
        /// Resource
        name: ResourceName,
        /// Resource pack path
        pack_path: PathBuf,
        /// Failure reason
        message: String,
    },
    /// Every queued pack entry was processed
    ApplyComplete {
        /// Resource pack path
        pack_path: PathBuf,
        /// Batch outcome
        result: BatchResult,
    },
}

/// Send side shared by the components of one session
///
/// A dropped receiver is not an error; events are simply discarded.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: UnboundedSender<StorageEvent>,
}

impl EventSink {
    /// Wrap a channel sender
    pub fn new(sender: UnboundedSender<StorageEvent>) -> Self {
        Self { sender }
    }

    /// Report `event` to the host
    pub fn emit(&self, event: StorageEvent) {
        let _ = self.sender.send(event);
    }
}
