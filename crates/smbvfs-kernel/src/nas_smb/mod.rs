//! Remote NAS mounts.
//!
//! Mounts are configured in `<agents root>/nas_smb/secrets/.env` and
//! appear as directories under `<agents root>/nas_smb/<mount>/`.
//!
//! - [`NasSmbClient`] - the protocol seam, one call per share operation
//! - [`NasSmbVfs`] - mount resolution and path rules over a client
//! - [`MountsProvider`] - where mount configs come from
//! - [`MemoryShareClient`] - a complete in-process share

mod client;
pub mod config;
mod error;
mod memory_client;
mod models;
mod mounts;
mod vfs;

pub use client::{DisabledClient, NasSmbClient};
pub use error::{NasSmbError, NasSmbErrorCode, NasSmbResult};
pub use memory_client::MemoryShareClient;
pub use models::{DEFAULT_PORT, MountConfig, RemoteMetadata};
pub use mounts::{EnvFileMounts, MountMap, MountsProvider, StaticMounts};
pub use vfs::{NasSmbVfs, normalize_rel, to_remote_path, to_share_path};
