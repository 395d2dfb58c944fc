//! Load outcomes reported to the host
//!
//! Every accepted request gets a [`LoadTicket`]. Exactly one success or
//! failure event is sent per ticket, preceded by any number of progress and
//! dependency events.

use crate::error::LoadStatus;
use crate::helper::LoadStage;
use std::sync::Arc;
use std::time::Duration;

/// Identifies one accepted load request
pub type LoadTicket = u64;

/// Everything the loader reports
#[derive(Debug)]
pub enum LoadEvent<A> {
    /// Asset available
    AssetSuccess {
        /// Request
        ticket: LoadTicket,
        /// Asset name
        asset_name: String,
        /// Shared pooled asset
        asset: Arc<A>,
        /// Time since the request was accepted
        duration: Duration,
    },
    /// Scene activated
    SceneSuccess {
        /// Request
        ticket: LoadTicket,
        /// Scene asset name
        scene_asset_name: String,
        /// Time since the request was accepted
        duration: Duration,
    },
    /// Request failed
    Failure {
        /// Request
        ticket: LoadTicket,
        /// Asset or scene name
        asset_name: String,
        /// Reason
        status: LoadStatus,
        /// Details
        message: String,
    },
    /// Stage progress
    Progress {
        /// Request
        ticket: LoadTicket,
        /// Asset or scene name
        asset_name: String,
        /// Stage reporting
        stage: LoadStage,
        /// Fraction done
        progress: f32,
    },
    /// One dependency of the requested asset finished loading
    DependencyLoaded {
        /// Request
        ticket: LoadTicket,
        /// Asset or scene name
        asset_name: String,
        /// Dependency that finished
        dependency_asset_name: String,
        /// Dependencies finished so far
        loaded_count: usize,
        /// Declared dependencies
        total_count: usize,
    },
}

impl<A> LoadEvent<A> {
    /// Request this event belongs to
    pub fn ticket(&self) -> LoadTicket {
        match self {
            Self::AssetSuccess { ticket, .. }
            | Self::SceneSuccess { ticket, .. }
            | Self::Failure { ticket, .. }
            | Self::Progress { ticket, .. }
            | Self::DependencyLoaded { ticket, .. } => *ticket,
        }
    }

    /// Whether this is the final event of its request
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AssetSuccess { .. } | Self::SceneSuccess { .. } | Self::Failure { .. }
        )
    }
}
