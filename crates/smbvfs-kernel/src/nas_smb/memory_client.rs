//! An in-process share client.
//!
//! Each share name gets its own [`MemoryBackend`], so two mounts of the
//! same share see the same files. Used by tests and demos that need a
//! complete share without a server.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use smbvfs_media::{BackendError, RemoteFile};

use super::client::NasSmbClient;
use super::error::{NasSmbError, NasSmbErrorCode, NasSmbResult};
use super::models::{MountConfig, RemoteMetadata};
use crate::vfs::{DirEntry, MemoryBackend, VfsError, VfsOps};

/// Shares held in memory, keyed by lowercased share name.
#[derive(Debug, Default)]
pub struct MemoryShareClient {
    shares: DashMap<String, Arc<MemoryBackend>>,
    offline: AtomicBool,
    open_files: Arc<AtomicUsize>,
}

impl MemoryShareClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend holding `share`, created on first use.
    pub fn share(&self, share: &str) -> Arc<MemoryBackend> {
        self.shares
            .entry(share.to_lowercase())
            .or_insert_with(|| Arc::new(MemoryBackend::new()))
            .clone()
    }

    /// Seed a file directly, bypassing mount rules.
    pub fn put(&self, share: &str, path: &str, data: &[u8]) -> NasSmbResult<()> {
        self.share(share)
            .write_all(Path::new(path), data)
            .map_err(|e| vfs_to_remote(e, path))
    }

    /// Simulate an unreachable host for every subsequent call.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Files opened through [`NasSmbClient::open_file`] and not yet closed.
    pub fn open_files(&self) -> usize {
        self.open_files.load(Ordering::Acquire)
    }

    fn backend(&self, mount: &MountConfig) -> NasSmbResult<Arc<MemoryBackend>> {
        if self.offline.load(Ordering::Acquire) {
            return Err(NasSmbError::host_unreachable("host is offline"));
        }
        Ok(self.share(&mount.share))
    }
}

/// Translate a backend error, keeping only the share-relative path.
fn vfs_to_remote(e: VfsError, path: &str) -> NasSmbError {
    let code = match &e {
        _ if e.is_not_found() => NasSmbErrorCode::NotFound,
        VfsError::PermissionDenied(_) | VfsError::ReadOnly => NasSmbErrorCode::PermissionDenied,
        VfsError::Remote(inner) => inner.code,
        _ => NasSmbErrorCode::Io,
    };
    NasSmbError::new(code, format!("{path}: {e}"))
}

impl NasSmbClient for MemoryShareClient {
    fn list_dir(&self, mount: &MountConfig, remote_dir: &str) -> NasSmbResult<Vec<DirEntry>> {
        let mut entries = self
            .backend(mount)?
            .readdir(Path::new(remote_dir))
            .map_err(|e| vfs_to_remote(e, remote_dir))?;
        entries.sort_by_key(|e| (!e.kind.is_dir(), e.name.to_lowercase()));
        Ok(entries)
    }

    fn metadata_or_null(
        &self,
        mount: &MountConfig,
        remote_path: &str,
    ) -> NasSmbResult<Option<RemoteMetadata>> {
        let backend = self.backend(mount)?;
        let attr = backend
            .metadata(Path::new(remote_path))
            .map_err(|e| vfs_to_remote(e, remote_path))?;
        Ok(attr.map(|attr| RemoteMetadata {
            kind: attr.kind,
            size: attr.is_file().then_some(attr.size),
            modified: Some(attr.mtime),
        }))
    }

    fn read_bytes(
        &self,
        mount: &MountConfig,
        remote_path: &str,
        max_bytes: u64,
    ) -> NasSmbResult<Vec<u8>> {
        let backend = self.backend(mount)?;
        let path = Path::new(remote_path);
        let attr = backend
            .getattr(path)
            .map_err(|e| vfs_to_remote(e, remote_path))?;
        if attr.size > max_bytes {
            return Err(NasSmbError::new(
                NasSmbErrorCode::Io,
                format!("{remote_path}: file too large ({} bytes, max {max_bytes})", attr.size),
            ));
        }
        backend.read_all(path).map_err(|e| vfs_to_remote(e, remote_path))
    }

    fn write_bytes(&self, mount: &MountConfig, remote_path: &str, data: &[u8]) -> NasSmbResult<()> {
        self.backend(mount)?
            .write_all(Path::new(remote_path), data)
            .map_err(|e| vfs_to_remote(e, remote_path))
    }

    fn mkdirs(&self, mount: &MountConfig, remote_dir: &str) -> NasSmbResult<()> {
        if remote_dir.trim_matches('/').is_empty() {
            return Ok(());
        }
        self.backend(mount)?
            .mkdir(Path::new(remote_dir), 0o755)
            .map(|_| ())
            .map_err(|e| vfs_to_remote(e, remote_dir))
    }

    fn delete(&self, mount: &MountConfig, remote_path: &str, recursive: bool) -> NasSmbResult<()> {
        let backend = self.backend(mount)?;
        let path = Path::new(remote_path);
        let attr = backend
            .getattr(path)
            .map_err(|e| vfs_to_remote(e, remote_path))?;
        let result = if !attr.is_dir() {
            backend.unlink(path)
        } else if recursive {
            backend.remove_all(path)
        } else {
            return Err(NasSmbError::new(
                NasSmbErrorCode::Io,
                format!("{remote_path}: refusing to delete a directory without recursive"),
            ));
        };
        result.map_err(|e| vfs_to_remote(e, remote_path))
    }

    fn move_path(
        &self,
        mount: &MountConfig,
        from: &str,
        to: &str,
        overwrite: bool,
    ) -> NasSmbResult<()> {
        let backend = self.backend(mount)?;
        let (from_path, to_path) = (Path::new(from), Path::new(to));
        if from_path == to_path {
            return Ok(());
        }
        if backend.exists(to_path) {
            if !overwrite {
                return Err(NasSmbError::new(
                    NasSmbErrorCode::Io,
                    format!("{to}: target exists"),
                ));
            }
            if !backend.exists(from_path) {
                return Err(NasSmbError::not_found(from.to_string()));
            }
            backend
                .remove_all(to_path)
                .map_err(|e| vfs_to_remote(e, to))?;
        }
        backend
            .rename(from_path, to_path)
            .map_err(|e| vfs_to_remote(e, from))
    }

    fn open_file(&self, mount: &MountConfig, remote_path: &str) -> NasSmbResult<Box<dyn RemoteFile>> {
        let backend = self.backend(mount)?;
        let attr = backend
            .getattr(Path::new(remote_path))
            .map_err(|e| vfs_to_remote(e, remote_path))?;
        if !attr.is_file() {
            return Err(NasSmbError::new(
                NasSmbErrorCode::Io,
                format!("{remote_path}: not a regular file"),
            ));
        }
        self.open_files.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemoryRemoteFile {
            backend,
            path: remote_path.to_string(),
            open_files: self.open_files.clone(),
            closed: false,
        }))
    }
}

/// An open file on a [`MemoryShareClient`] share.
///
/// Reads see writes made after opening, like a live share would.
struct MemoryRemoteFile {
    backend: Arc<MemoryBackend>,
    path: String,
    open_files: Arc<AtomicUsize>,
    closed: bool,
}

impl MemoryRemoteFile {
    fn map(&self, e: VfsError) -> BackendError {
        let remote = vfs_to_remote(e, &self.path);
        BackendError::Mapped((&remote).into())
    }
}

impl RemoteFile for MemoryRemoteFile {
    fn size(&mut self) -> Result<u64, BackendError> {
        self.backend
            .getattr(Path::new(&self.path))
            .map(|attr| attr.size)
            .map_err(|e| self.map(e))
    }

    fn read_at(&mut self, offset: u64, len: usize) -> Result<Bytes, BackendError> {
        if self.closed {
            return Err(BackendError::other("read on a closed handle"));
        }
        self.backend
            .read(Path::new(&self.path), offset, len)
            .map(Bytes::from)
            .map_err(|e| self.map(e))
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if !self.closed {
            self.closed = true;
            self.open_files.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

impl Drop for MemoryRemoteFile {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount() -> MountConfig {
        MountConfig::guest("home", "Users")
    }

    #[test]
    fn listing_puts_directories_first() {
        let client = MemoryShareClient::new();
        client.put("users", "b.txt", b"b").unwrap();
        client.put("users", "A.txt", b"a").unwrap();
        client.put("users", "zdir/x", b"x").unwrap();

        let names: Vec<_> = client
            .list_dir(&mount(), "")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["zdir", "A.txt", "b.txt"]);
    }

    #[test]
    fn read_bytes_honours_the_cap() {
        let client = MemoryShareClient::new();
        client.put("users", "f", &[7; 10]).unwrap();
        assert_eq!(client.read_bytes(&mount(), "f", 10).unwrap().len(), 10);
        assert_eq!(
            client.read_bytes(&mount(), "f", 9).unwrap_err().code,
            NasSmbErrorCode::Io
        );
        assert_eq!(
            client.read_bytes(&mount(), "missing", 9).unwrap_err().code,
            NasSmbErrorCode::NotFound
        );
    }

    #[test]
    fn delete_and_move() {
        let client = MemoryShareClient::new();
        let m = mount();
        client.write_bytes(&m, "dir/a.txt", b"a").unwrap();
        client.write_bytes(&m, "b.txt", b"b").unwrap();

        assert_eq!(client.delete(&m, "dir", false).unwrap_err().code, NasSmbErrorCode::Io);
        assert_eq!(
            client.move_path(&m, "dir/a.txt", "b.txt", false).unwrap_err().code,
            NasSmbErrorCode::Io
        );
        client.move_path(&m, "dir/a.txt", "b.txt", true).unwrap();
        assert_eq!(client.read_bytes(&m, "b.txt", 10).unwrap(), b"a");

        client.delete(&m, "dir", true).unwrap();
        assert_eq!(client.metadata_or_null(&m, "dir").unwrap(), None);
    }

    #[test]
    fn offline_fails_everything() {
        let client = MemoryShareClient::new();
        client.set_offline(true);
        assert_eq!(
            client.metadata_or_null(&mount(), "x").unwrap_err().code,
            NasSmbErrorCode::HostUnreachable
        );
    }

    #[test]
    fn open_files_are_counted() {
        let client = MemoryShareClient::new();
        client.put("users", "movie.mp4", &[1, 2, 3, 4]).unwrap();

        let mut file = client.open_file(&mount(), "movie.mp4").unwrap();
        assert_eq!(client.open_files(), 1);
        assert_eq!(file.size().unwrap(), 4);
        assert_eq!(file.read_at(2, 10).unwrap().as_ref(), &[3, 4]);
        file.close().unwrap();
        file.close().unwrap();
        assert_eq!(client.open_files(), 0);

        let dropped = client.open_file(&mount(), "movie.mp4").unwrap();
        drop(dropped);
        assert_eq!(client.open_files(), 0);
    }
}
