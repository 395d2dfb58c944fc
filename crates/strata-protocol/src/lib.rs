//! HTTP download transport for strata
//!
//! [`HttpTransport`] implements the storage [`Transport`] seam on reqwest and
//! tokio. The storage session stays synchronous: it submits downloads and
//! drains events from its tick, while the transfers themselves run on the
//! tokio runtime the transport was created on.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use strata_client_storage::{StorageConfig, StorageSession};
//! use strata_protocol::{HttpTransport, HttpTransportConfig};
//!
//! let transport = HttpTransport::new(&HttpTransportConfig::from_env())?;
//! let config = StorageConfig::new("/game/ro", "/game/rw")
//!     .with_update_prefix_uri("https://cdn.example.com/game");
//! let session = StorageSession::new(config, Box::new(transport))?;
//! # drop(session);
//! # Ok(())
//! # }
//! ```
//!
//! [`Transport`]: strata_client_storage::Transport

#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod transport;

pub use config::HttpTransportConfig;
pub use error::{Result, TransportError};
pub use transport::{HttpTransport, partial_path};
