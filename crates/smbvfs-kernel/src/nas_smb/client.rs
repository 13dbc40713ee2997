//! The share client seam.
//!
//! A client speaks the wire protocol for one mount at a time. Paths given
//! to it are share-relative, `/`-separated and already joined with the
//! mount's remote dir; an empty path is the share root.

use smbvfs_media::RemoteFile;

use super::error::{NasSmbError, NasSmbResult};
use super::models::{MountConfig, RemoteMetadata};
use crate::vfs::DirEntry;

pub trait NasSmbClient: Send + Sync {
    /// Entries of a directory, directories first, then by lowercase name.
    fn list_dir(&self, mount: &MountConfig, remote_dir: &str) -> NasSmbResult<Vec<DirEntry>>;

    /// Metadata, or `None` when nothing is at the path.
    fn metadata_or_null(
        &self,
        mount: &MountConfig,
        remote_path: &str,
    ) -> NasSmbResult<Option<RemoteMetadata>>;

    /// Whole contents of a file. Files larger than `max_bytes` are refused.
    fn read_bytes(&self, mount: &MountConfig, remote_path: &str, max_bytes: u64)
    -> NasSmbResult<Vec<u8>>;

    /// Create or replace a file, creating missing parent directories.
    fn write_bytes(&self, mount: &MountConfig, remote_path: &str, data: &[u8]) -> NasSmbResult<()>;

    /// Create a directory and any missing parents.
    fn mkdirs(&self, mount: &MountConfig, remote_dir: &str) -> NasSmbResult<()>;

    /// Remove a file, or a directory when `recursive` is set.
    fn delete(&self, mount: &MountConfig, remote_path: &str, recursive: bool) -> NasSmbResult<()>;

    /// Rename within the share. With `overwrite`, an existing target is
    /// removed first.
    fn move_path(
        &self,
        mount: &MountConfig,
        from: &str,
        to: &str,
        overwrite: bool,
    ) -> NasSmbResult<()>;

    /// Open a file for positional reads (the streaming path).
    fn open_file(&self, mount: &MountConfig, remote_path: &str) -> NasSmbResult<Box<dyn RemoteFile>>;
}

/// A client for builds without a protocol stack.
///
/// Reports no metadata and fails everything else as unreachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledClient;

impl DisabledClient {
    fn disabled() -> NasSmbError {
        NasSmbError::host_unreachable("share client is disabled in this build")
    }
}

impl NasSmbClient for DisabledClient {
    fn list_dir(&self, _mount: &MountConfig, _remote_dir: &str) -> NasSmbResult<Vec<DirEntry>> {
        Err(Self::disabled())
    }

    fn metadata_or_null(
        &self,
        _mount: &MountConfig,
        _remote_path: &str,
    ) -> NasSmbResult<Option<RemoteMetadata>> {
        Ok(None)
    }

    fn read_bytes(
        &self,
        _mount: &MountConfig,
        _remote_path: &str,
        _max_bytes: u64,
    ) -> NasSmbResult<Vec<u8>> {
        Err(Self::disabled())
    }

    fn write_bytes(&self, _mount: &MountConfig, _remote_path: &str, _data: &[u8]) -> NasSmbResult<()> {
        Err(Self::disabled())
    }

    fn mkdirs(&self, _mount: &MountConfig, _remote_dir: &str) -> NasSmbResult<()> {
        Err(Self::disabled())
    }

    fn delete(&self, _mount: &MountConfig, _remote_path: &str, _recursive: bool) -> NasSmbResult<()> {
        Err(Self::disabled())
    }

    fn move_path(
        &self,
        _mount: &MountConfig,
        _from: &str,
        _to: &str,
        _overwrite: bool,
    ) -> NasSmbResult<()> {
        Err(Self::disabled())
    }

    fn open_file(
        &self,
        _mount: &MountConfig,
        _remote_path: &str,
    ) -> NasSmbResult<Box<dyn RemoteFile>> {
        Err(Self::disabled())
    }
}
