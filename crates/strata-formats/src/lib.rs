//! Binary formats for strata resource distribution
//!
//! - [`name`]: resource identity (`name[.variant][.extension]`)
//! - [`load_type`]: per-resource load type and its XOR transform
//! - [`version_list`]: package, updatable, local and resource pack manifests
//! - [`filesystem`]: layout of file system containers
//! - [`compression`]: zlib helpers and a reusable scratch buffer
//! - [`payload`]: encoding a resource into its served form
//!
//! # Examples
//!
//! ```
//! use strata_formats::version_list::{
//!     UpdatableResource, UpdatableVersionList, VersionListFormat,
//! };
//! use strata_formats::{LoadType, ResourceName, ResourcePayload};
//!
//! let name = ResourceName::new("ui", None::<&str>, Some("dat"));
//! let payload = ResourcePayload::encode(LoadType::LoadFromFile, b"bytes", false).unwrap();
//!
//! let list = UpdatableVersionList::builder("1.0", 1)
//!     .resource(UpdatableResource::new(
//!         name.clone(),
//!         LoadType::LoadFromFile,
//!         payload.length,
//!         payload.hash,
//!         payload.compressed_length,
//!         payload.compressed_hash,
//!     ))
//!     .asset(&name, "ui/button", &[])
//!     .build()
//!     .unwrap();
//!
//! let data = list.build().unwrap();
//! assert_eq!(UpdatableVersionList::parse(&data).unwrap(), list);
//! ```

#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![warn(missing_docs)]

pub mod compression;
pub mod filesystem;
pub mod load_type;
pub mod name;
pub mod payload;
pub mod version_list;

pub use load_type::{Encryption, LoadType};
pub use name::ResourceName;
pub use payload::ResourcePayload;
