//! Agents-root filesystem with remote mounts spliced in.
//!
//! Everything under the agents root is served by a local delegate except
//! `nas_smb/<mount>/...`, which goes to [`NasSmbVfs`]. The `secrets`
//! directory and `.mount.json` descriptors stay local even though they
//! sit inside `nas_smb/`.
//!
//! Paths are resolved lexically before they are classified, so
//! `nas_smb/home/../secrets/.env` is a local path and a path that climbs
//! above the agents root is refused.

use std::fmt;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use smbvfs_media::agents_path::{NAS_SMB_DIR, normalize_segments};
use smbvfs_media::config::DEFAULT_MAX_WHOLE_FILE_BYTES;
use smbvfs_media::VirtualPath;
use tracing::{debug, warn};

use crate::handle::{FileHandle, VfsFileHandle, WholeFileHandle};
use crate::nas_smb::{NasSmbVfs, RemoteMetadata};
use crate::vfs::{DirEntry, FileAttr, StatFs, VfsError, VfsOps, VfsResult};

/// Where a path is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Relative to the local delegate's root.
    Local(PathBuf),
    Remote(VirtualPath),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Local(_) => write!(f, "local"),
            Route::Remote(vp) if vp.is_mount_root() => write!(f, "remote {}", vp.mount_name),
            Route::Remote(vp) => write!(f, "remote {} {}", vp.mount_name, vp.rel_path),
        }
    }
}

fn display(vp: &VirtualPath) -> String {
    vp.to_agents_path()
}

/// Routes agents-root paths to the local delegate or a remote mount.
pub struct AgentsVfs {
    root: PathBuf,
    local: Arc<dyn VfsOps>,
    remote: Arc<NasSmbVfs>,
    max_whole_file_bytes: u64,
}

impl fmt::Debug for AgentsVfs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentsVfs")
            .field("root", &self.root)
            .field("max_whole_file_bytes", &self.max_whole_file_bytes)
            .finish_non_exhaustive()
    }
}

impl AgentsVfs {
    /// `local` must be rooted at `root`; absolute paths under `root` are
    /// made relative before they reach it.
    pub fn new(root: impl Into<PathBuf>, local: Arc<dyn VfsOps>, remote: Arc<NasSmbVfs>) -> Self {
        Self {
            root: root.into(),
            local,
            remote,
            max_whole_file_bytes: DEFAULT_MAX_WHOLE_FILE_BYTES,
        }
    }

    /// Cap on remote files loaded whole (reads, edits, cross-mount moves).
    pub fn with_max_whole_file_bytes(mut self, max: u64) -> Self {
        self.max_whole_file_bytes = max;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn local(&self) -> &Arc<dyn VfsOps> {
        &self.local
    }

    pub fn remote(&self) -> &Arc<NasSmbVfs> {
        &self.remote
    }

    /// Classify a path.
    pub fn route(&self, path: &Path) -> VfsResult<Route> {
        let rel = if path.is_absolute() {
            path.strip_prefix(&self.root)
                .map_err(|_| VfsError::path_escapes_root(path.display().to_string()))?
        } else {
            path
        };
        let text = rel
            .to_str()
            .ok_or_else(|| VfsError::invalid_path(path.display().to_string()))?;
        let segs = normalize_segments(text)
            .ok_or_else(|| VfsError::path_escapes_root(path.display().to_string()))?;

        Ok(match VirtualPath::from_segments(&segs) {
            Some(vp) => Route::Remote(vp),
            None => Route::Local(PathBuf::from(segs.join("/"))),
        })
    }

    fn mount_exists(&self, mount_name: &str) -> VfsResult<bool> {
        let key = mount_name.trim().to_lowercase();
        Ok(self.remote.mounts_by_name()?.contains_key(&key))
    }

    fn remote_meta(&self, vp: &VirtualPath) -> VfsResult<Option<RemoteMetadata>> {
        Ok(self.remote.metadata_or_null(&vp.mount_name, &vp.rel_path)?)
    }

    /// Metadata of an existing regular file.
    fn remote_file(&self, vp: &VirtualPath) -> VfsResult<RemoteMetadata> {
        if vp.is_mount_root() {
            return Err(VfsError::is_a_directory(display(vp)));
        }
        match self.remote_meta(vp)? {
            None => Err(VfsError::not_found(display(vp))),
            Some(meta) if meta.is_dir() => Err(VfsError::is_a_directory(display(vp))),
            Some(meta) => Ok(meta),
        }
    }

    fn check_whole_file(&self, meta: &RemoteMetadata) -> VfsResult<()> {
        match meta.size {
            Some(size) if size > self.max_whole_file_bytes => Err(VfsError::FileTooLarge {
                size,
                limit: self.max_whole_file_bytes,
            }),
            _ => Ok(()),
        }
    }

    fn read_remote(&self, vp: &VirtualPath) -> VfsResult<Vec<u8>> {
        let meta = self.remote_file(vp)?;
        self.check_whole_file(&meta)?;
        Ok(self
            .remote
            .read_bytes(&vp.mount_name, &vp.rel_path, self.max_whole_file_bytes)?)
    }

    fn writer(&self, vp: &VirtualPath) -> WholeFileHandle {
        WholeFileHandle::writer(
            Arc::clone(&self.remote),
            &vp.mount_name,
            &vp.rel_path,
            self.max_whole_file_bytes,
        )
    }

    /// Lists `nas_smb/` with a directory entry for every configured mount.
    fn list_mounts_dir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let (mut entries, local_missing) = match self.local.readdir(path) {
            Ok(entries) => (entries, false),
            Err(e) if e.is_not_found() => (Vec::new(), true),
            Err(e) => return Err(e),
        };
        match self.remote.mounts_by_name() {
            Ok(mounts) => {
                for mount in mounts.values() {
                    if !entries.iter().any(|e| e.name.eq_ignore_ascii_case(&mount.mount_name)) {
                        entries.push(DirEntry::directory(&mount.mount_name));
                    }
                }
            }
            Err(e) => warn!(code = %e.code, "mount configuration unavailable"),
        }
        if local_missing && entries.is_empty() {
            return Err(VfsError::not_found(NAS_SMB_DIR));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_route(&self, route: &Route) -> VfsResult<Vec<u8>> {
        match route {
            Route::Local(p) => self.local.read_all(p),
            Route::Remote(vp) => self.read_remote(vp),
        }
    }

    fn write_route(&self, route: &Route, data: &[u8]) -> VfsResult<()> {
        match route {
            Route::Local(p) => self.local.write_all(p, data),
            Route::Remote(vp) if vp.is_mount_root() => Err(VfsError::is_a_directory(display(vp))),
            Route::Remote(vp) => Ok(self.remote.write_bytes(&vp.mount_name, &vp.rel_path, data)?),
        }
    }

    // ========================================================================
    // Handle-level operations
    // ========================================================================

    /// Open an existing file for reading.
    pub fn open_read(&self, path: &Path) -> VfsResult<Box<dyn FileHandle>> {
        match self.route(path)? {
            Route::Local(p) => {
                if self.local.getattr(&p)?.is_dir() {
                    return Err(VfsError::is_a_directory(p.display().to_string()));
                }
                Ok(Box::new(VfsFileHandle::new(Arc::clone(&self.local), p, false)))
            }
            Route::Remote(vp) => {
                self.remote_file(&vp)?;
                Ok(Box::new(WholeFileHandle::reader(
                    Arc::clone(&self.remote),
                    &vp.mount_name,
                    &vp.rel_path,
                    self.max_whole_file_bytes,
                )))
            }
        }
    }

    /// Open for reading and writing. `must_create` fails on an existing
    /// file and `must_exist` on a missing one; the two are exclusive.
    pub fn open_read_write(
        &self,
        path: &Path,
        must_create: bool,
        must_exist: bool,
    ) -> VfsResult<Box<dyn FileHandle>> {
        if must_create && must_exist {
            return Err(VfsError::other("must_create and must_exist are mutually exclusive"));
        }
        match self.route(path)? {
            Route::Local(p) => {
                let exists = match self.local.metadata(&p)? {
                    Some(attr) if attr.is_dir() => {
                        return Err(VfsError::is_a_directory(p.display().to_string()));
                    }
                    other => other.is_some(),
                };
                check_presence(&p.display().to_string(), exists, must_create, must_exist)?;
                if !exists {
                    self.local.create(&p, 0o644)?;
                }
                Ok(Box::new(VfsFileHandle::new(Arc::clone(&self.local), p, true)))
            }
            Route::Remote(vp) => {
                if vp.is_mount_root() {
                    return Err(VfsError::is_a_directory(display(&vp)));
                }
                let exists = match self.remote_meta(&vp)? {
                    Some(meta) if meta.is_dir() => {
                        return Err(VfsError::is_a_directory(display(&vp)));
                    }
                    other => other.is_some(),
                };
                check_presence(&display(&vp), exists, must_create, must_exist)?;
                let mut handle = self.writer(&vp);
                if !exists {
                    handle.mark_dirty();
                }
                Ok(Box::new(handle))
            }
        }
    }

    /// Whole contents as a reader.
    pub fn source(&self, path: &Path) -> VfsResult<Box<dyn Read + Send>> {
        match self.route(path)? {
            Route::Local(_) => {
                let handle = self.open_read(path)?;
                Ok(Box::new(handle))
            }
            Route::Remote(vp) => Ok(Box::new(Cursor::new(self.read_remote(&vp)?))),
        }
    }

    /// A handle that replaces the file's contents. The file exists (empty)
    /// once the handle is closed, even if nothing was written.
    pub fn sink(&self, path: &Path, must_create: bool) -> VfsResult<Box<dyn FileHandle>> {
        match self.route(path)? {
            Route::Local(p) => {
                if must_create && self.local.exists(&p) {
                    return Err(VfsError::already_exists(p.display().to_string()));
                }
                self.local.write_all(&p, &[])?;
                Ok(Box::new(VfsFileHandle::new(Arc::clone(&self.local), p, true)))
            }
            Route::Remote(vp) => {
                if vp.is_mount_root() {
                    return Err(VfsError::is_a_directory(display(&vp)));
                }
                match self.remote_meta(&vp)? {
                    Some(meta) if meta.is_dir() => {
                        return Err(VfsError::is_a_directory(display(&vp)));
                    }
                    Some(_) if must_create => {
                        return Err(VfsError::already_exists(display(&vp)));
                    }
                    _ => {}
                }
                Ok(Box::new(WholeFileHandle::truncated(
                    Arc::clone(&self.remote),
                    &vp.mount_name,
                    &vp.rel_path,
                    self.max_whole_file_bytes,
                )))
            }
        }
    }

    /// A handle positioned at the end of the file, creating it unless
    /// `must_exist` is set.
    pub fn appending_sink(&self, path: &Path, must_exist: bool) -> VfsResult<Box<dyn FileHandle>> {
        match self.route(path)? {
            Route::Local(p) => {
                if !self.local.exists(&p) {
                    if must_exist {
                        return Err(VfsError::not_found(p.display().to_string()));
                    }
                    self.local.create(&p, 0o644)?;
                }
                let handle = VfsFileHandle::new(Arc::clone(&self.local), p, true).at_end()?;
                Ok(Box::new(handle))
            }
            Route::Remote(vp) => {
                if vp.is_mount_root() {
                    return Err(VfsError::is_a_directory(display(&vp)));
                }
                match self.remote_meta(&vp)? {
                    None if must_exist => return Err(VfsError::not_found(display(&vp))),
                    Some(meta) if meta.is_dir() => {
                        return Err(VfsError::is_a_directory(display(&vp)));
                    }
                    Some(meta) => self.check_whole_file(&meta)?,
                    None => {}
                }
                let handle = WholeFileHandle::appending(
                    Arc::clone(&self.remote),
                    &vp.mount_name,
                    &vp.rel_path,
                    self.max_whole_file_bytes,
                )?;
                Ok(Box::new(handle))
            }
        }
    }

    // ========================================================================
    // Path-level operations
    // ========================================================================

    /// Create a directory and its parents. An existing path is fine unless
    /// `must_create` is set.
    pub fn create_directory(&self, path: &Path, must_create: bool) -> VfsResult<()> {
        if self.metadata(path)?.is_some() {
            if must_create {
                return Err(VfsError::already_exists(path.display().to_string()));
            }
            return Ok(());
        }
        self.mkdir(path, 0o755).map(|_| ())
    }

    /// Remove a file or directory. Remote directories go recursively; local
    /// directories must be empty.
    pub fn delete(&self, path: &Path, must_exist: bool) -> VfsResult<()> {
        match self.route(path)? {
            Route::Local(p) => match self.local.metadata(&p)? {
                None if must_exist => Err(VfsError::not_found(p.display().to_string())),
                None => Ok(()),
                Some(attr) if attr.is_dir() => self.local.rmdir(&p),
                Some(_) => self.local.unlink(&p),
            },
            Route::Remote(vp) => {
                if vp.is_mount_root() {
                    return Err(VfsError::permission_denied(display(&vp)));
                }
                match self.remote_meta(&vp)? {
                    None if must_exist => Err(VfsError::not_found(display(&vp))),
                    None => Ok(()),
                    Some(meta) => {
                        Ok(self.remote.delete(&vp.mount_name, &vp.rel_path, meta.is_dir())?)
                    }
                }
            }
        }
    }

    /// Move a file, replacing the target.
    ///
    /// Within one mount, or within the local tree, this is a rename.
    /// Anything else is copied whole and the source removed afterwards.
    pub fn atomic_move(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let source = self.route(from)?;
        let target = self.route(to)?;
        match (&source, &target) {
            (Route::Local(a), Route::Local(b)) => self.local.rename(a, b),
            (Route::Remote(a), Route::Remote(b))
                if a.mount_name.eq_ignore_ascii_case(&b.mount_name) =>
            {
                Ok(self
                    .remote
                    .move_path(&a.mount_name, &a.rel_path, &b.rel_path, true)?)
            }
            _ => {
                debug!(from = %source, to = %target, "moving by copy");
                let data = self.read_route(&source)?;
                self.write_route(&target, &data)?;
                self.delete(from, false)
            }
        }
    }

    /// Create a local symlink at `link` pointing to `target`.
    ///
    /// A relative target is resolved against the link's directory before it
    /// is classified. Targets on a remote mount or outside the root are
    /// refused.
    pub fn create_symlink(&self, link: &Path, target: &Path) -> VfsResult<()> {
        let Route::Local(local_link) = self.route(link)? else {
            return Err(VfsError::unsupported("symlinks on a remote mount"));
        };
        let resolved = if target.is_absolute() {
            target.to_path_buf()
        } else {
            local_link.parent().unwrap_or(Path::new("")).join(target)
        };
        match self.route(&resolved)? {
            Route::Local(_) => self.local.symlink(&local_link, target).map(|_| ()),
            Route::Remote(vp) => Err(VfsError::unsupported(format!(
                "symlink to remote mount {}",
                vp.mount_name
            ))),
        }
    }
}

fn check_presence(path: &str, exists: bool, must_create: bool, must_exist: bool) -> VfsResult<()> {
    if must_create && exists {
        return Err(VfsError::already_exists(path));
    }
    if must_exist && !exists {
        return Err(VfsError::not_found(path));
    }
    Ok(())
}

impl VfsOps for AgentsVfs {
    fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        match self.route(path)? {
            Route::Local(p) => self.local.getattr(&p),
            Route::Remote(vp) if vp.is_mount_root() => {
                if self.mount_exists(&vp.mount_name)? {
                    Ok(FileAttr::directory(0o755))
                } else {
                    Err(VfsError::not_found(display(&vp)))
                }
            }
            Route::Remote(vp) => self
                .remote_meta(&vp)?
                .map(|meta| meta.to_attr())
                .ok_or_else(|| VfsError::not_found(display(&vp))),
        }
    }

    /// Local listings are sorted by name; remote listings keep the share
    /// order (directories first).
    fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        match self.route(path)? {
            Route::Local(p) if p == Path::new(NAS_SMB_DIR) => self.list_mounts_dir(&p),
            Route::Local(p) => self.local.readdir(&p),
            Route::Remote(vp) => Ok(self.remote.list_dir(&vp.mount_name, &vp.rel_path)?),
        }
    }

    fn read(&self, path: &Path, offset: u64, size: usize) -> VfsResult<Vec<u8>> {
        match self.route(path)? {
            Route::Local(p) => self.local.read(&p, offset, size),
            Route::Remote(vp) => {
                let data = self.read_remote(&vp)?;
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
                let end = start.saturating_add(size).min(data.len());
                Ok(data[start..end].to_vec())
            }
        }
    }

    fn readlink(&self, path: &Path) -> VfsResult<PathBuf> {
        match self.route(path)? {
            Route::Local(p) => self.local.readlink(&p),
            Route::Remote(vp) => Err(VfsError::NotASymlink(display(&vp))),
        }
    }

    fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<usize> {
        match self.route(path)? {
            Route::Local(p) => self.local.write(&p, offset, data),
            Route::Remote(vp) => {
                let meta = self.remote_file(&vp)?;
                self.check_whole_file(&meta)?;
                let mut handle = self.writer(&vp);
                write_at(&mut handle, offset, data)?;
                handle.close()?;
                Ok(data.len())
            }
        }
    }

    fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        match self.route(path)? {
            Route::Local(p) => self.local.create(&p, mode),
            Route::Remote(vp) => {
                if vp.is_mount_root() || self.remote_meta(&vp)?.is_some() {
                    return Err(VfsError::already_exists(display(&vp)));
                }
                self.remote.write_bytes(&vp.mount_name, &vp.rel_path, &[])?;
                Ok(FileAttr::file(0, mode))
            }
        }
    }

    fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        match self.route(path)? {
            Route::Local(p) => self.local.mkdir(&p, mode),
            Route::Remote(vp) if vp.is_mount_root() => self.getattr(path),
            Route::Remote(vp) => {
                if let Some(meta) = self.remote_meta(&vp)? {
                    if !meta.is_dir() {
                        return Err(VfsError::already_exists(display(&vp)));
                    }
                }
                self.remote.mkdirs(&vp.mount_name, &vp.rel_path)?;
                Ok(FileAttr::directory(mode))
            }
        }
    }

    fn unlink(&self, path: &Path) -> VfsResult<()> {
        match self.route(path)? {
            Route::Local(p) => self.local.unlink(&p),
            Route::Remote(vp) => {
                self.remote_file(&vp)?;
                Ok(self.remote.delete(&vp.mount_name, &vp.rel_path, false)?)
            }
        }
    }

    fn rmdir(&self, path: &Path) -> VfsResult<()> {
        match self.route(path)? {
            Route::Local(p) => self.local.rmdir(&p),
            Route::Remote(vp) if vp.is_mount_root() => {
                Err(VfsError::permission_denied(display(&vp)))
            }
            Route::Remote(vp) => {
                match self.remote_meta(&vp)? {
                    None => return Err(VfsError::not_found(display(&vp))),
                    Some(meta) if !meta.is_dir() => {
                        return Err(VfsError::not_a_directory(display(&vp)));
                    }
                    Some(_) => {}
                }
                if !self.remote.list_dir(&vp.mount_name, &vp.rel_path)?.is_empty() {
                    return Err(VfsError::directory_not_empty(display(&vp)));
                }
                Ok(self.remote.delete(&vp.mount_name, &vp.rel_path, true)?)
            }
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        self.atomic_move(from, to)
    }

    fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        match self.route(path)? {
            Route::Local(p) => self.local.truncate(&p, size),
            Route::Remote(vp) => {
                let meta = self.remote_file(&vp)?;
                self.check_whole_file(&meta)?;
                let mut handle = self.writer(&vp);
                handle.set_len(size)?;
                handle.close()?;
                Ok(())
            }
        }
    }

    fn symlink(&self, path: &Path, target: &Path) -> VfsResult<FileAttr> {
        self.create_symlink(path, target)?;
        self.getattr(path)
    }

    fn read_only(&self) -> bool {
        false
    }

    fn statfs(&self) -> VfsResult<StatFs> {
        self.local.statfs()
    }
}

fn write_at(handle: &mut WholeFileHandle, offset: u64, data: &[u8]) -> std::io::Result<()> {
    use std::io::{Seek, SeekFrom, Write};
    handle.seek(SeekFrom::Start(offset))?;
    handle.write_all(data)
}
