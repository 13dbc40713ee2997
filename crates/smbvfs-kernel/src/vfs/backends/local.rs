//! Local filesystem backend.
//!
//! Provides access to real filesystem paths, with path security
//! to prevent escaping the root directory.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::VfsOps;
use crate::vfs::types::{DirEntry, FileAttr, FileType, StatFs};

/// Local filesystem backend.
///
/// All operations are relative to `root`. If `root` is `/data/agents`,
/// then `read("nas_smb/secrets/.env")` reads
/// `/data/agents/nas_smb/secrets/.env`.
///
/// Attempts to escape via `..` or symlinks pointing outside are blocked.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    read_only: bool,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time so symlinked roots
    /// (macOS `/tmp` → `/private/tmp`) compare correctly.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self {
            root,
            read_only: false,
        }
    }

    /// Create a read-only local filesystem.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            read_only: true,
            ..Self::new(root)
        }
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path to an absolute path within the root.
    fn resolve(&self, path: &Path) -> VfsResult<PathBuf> {
        let path = path.strip_prefix("/").unwrap_or(path);

        // Lexical pass first: a `..` that climbs above the root is refused
        // even when the intermediate directories don't exist.
        let mut depth = 0usize;
        for component in path.components() {
            match component {
                Component::ParentDir => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| VfsError::path_escapes_root(path.display().to_string()))?;
                }
                Component::Normal(_) => depth += 1,
                _ => {}
            }
        }

        if path.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }

        let full = self.root.join(path);
        let canonical = if full.exists() {
            dunce::canonicalize(&full)?
        } else {
            // New entries: canonicalize the parent and append the name
            let parent = full.parent().ok_or_else(|| VfsError::invalid_path("no parent"))?;
            let filename = full
                .file_name()
                .ok_or_else(|| VfsError::invalid_path("no filename"))?;
            if parent.exists() {
                dunce::canonicalize(parent)?.join(filename)
            } else {
                full
            }
        };

        if !canonical.starts_with(&self.root) {
            return Err(VfsError::path_escapes_root(format!(
                "{} is not under {}",
                canonical.display(),
                self.root.display()
            )));
        }

        Ok(canonical)
    }

    /// Like [`resolve`](Self::resolve), but a symlink in the final
    /// component is not followed.
    fn resolve_entry(&self, path: &Path) -> VfsResult<PathBuf> {
        let rel = path.strip_prefix("/").unwrap_or(path);
        match (rel.parent(), rel.file_name()) {
            (Some(parent), Some(name)) => Ok(self.resolve(parent)?.join(name)),
            _ => self.resolve(rel),
        }
    }

    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn metadata_to_attr(meta: &fs::Metadata) -> FileAttr {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else if meta.file_type().is_symlink() {
            FileType::Symlink
        } else {
            FileType::File
        };

        FileAttr {
            size: meta.len(),
            kind,
            perm: meta.permissions().mode() & 0o7777,
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
            atime: meta.accessed().ok(),
            ctime: meta.created().ok(),
            nlink: meta.nlink() as u32,
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
        }
    }

    fn ensure_parent(full_path: &Path) -> VfsResult<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl VfsOps for LocalBackend {
    fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let full_path = self.resolve_entry(path)?;
        let meta = fs::symlink_metadata(&full_path)?;
        Ok(Self::metadata_to_attr(&meta))
    }

    fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let full_path = self.resolve(path)?;
        let mut entries = Vec::new();

        for entry in fs::read_dir(&full_path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let kind = if file_type.is_dir() {
                FileType::Directory
            } else if file_type.is_symlink() {
                FileType::Symlink
            } else {
                FileType::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read(&self, path: &Path, offset: u64, size: usize) -> VfsResult<Vec<u8>> {
        let full_path = self.resolve(path)?;
        let mut file = fs::File::open(&full_path)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = Vec::new();
        file.take(size as u64).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn readlink(&self, path: &Path) -> VfsResult<PathBuf> {
        let full_path = self.resolve_entry(path)?;
        Ok(fs::read_link(&full_path)?)
    }

    fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<usize> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;

        let mut file = fs::OpenOptions::new().write(true).open(&full_path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(data.len())
    }

    fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        Self::ensure_parent(&full_path)?;

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&full_path)?;

        let meta = file.metadata()?;
        Ok(Self::metadata_to_attr(&meta))
    }

    fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;

        fs::DirBuilder::new()
            .mode(mode)
            .recursive(true)
            .create(&full_path)?;

        let meta = fs::metadata(&full_path)?;
        Ok(Self::metadata_to_attr(&meta))
    }

    fn unlink(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve_entry(path)?;
        Ok(fs::remove_file(&full_path)?)
    }

    fn rmdir(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        Ok(fs::remove_dir(&full_path)?)
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let from_path = self.resolve_entry(from)?;
        let to_path = self.resolve_entry(to)?;
        Self::ensure_parent(&to_path)?;
        Ok(fs::rename(&from_path, &to_path)?)
    }

    fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        let file = fs::OpenOptions::new().write(true).open(&full_path)?;
        Ok(file.set_len(size)?)
    }

    fn symlink(&self, path: &Path, target: &Path) -> VfsResult<FileAttr> {
        self.check_writable()?;
        let full_path = self.resolve_entry(path)?;
        Self::ensure_parent(&full_path)?;
        std::os::unix::fs::symlink(target, &full_path)?;
        self.getattr(path)
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn statfs(&self) -> VfsResult<StatFs> {
        let stat = rustix::fs::statvfs(&self.root).map_err(|e| VfsError::Io(e.into()))?;

        Ok(StatFs {
            blocks: stat.f_blocks,
            bfree: stat.f_bfree,
            bavail: stat.f_bavail,
            files: stat.f_files,
            ffree: stat.f_ffree,
            bsize: stat.f_bsize as u32,
            namelen: stat.f_namemax as u32,
            frsize: stat.f_frsize as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (LocalBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path());
        (backend, dir)
    }

    #[test]
    fn test_create_and_read() {
        let (backend, _dir) = setup();
        backend.create(Path::new("test.txt"), 0o644).unwrap();
        backend.write(Path::new("test.txt"), 0, b"hello world").unwrap();

        let data = backend.read(Path::new("test.txt"), 0, 100).unwrap();
        assert_eq!(data, b"hello world");

        let data = backend.read(Path::new("test.txt"), 6, 5).unwrap();
        assert_eq!(data, b"world");
    }

    #[test]
    fn test_create_existing_fails() {
        let (backend, _dir) = setup();
        backend.create(Path::new("a.txt"), 0o644).unwrap();
        let err = backend.create(Path::new("a.txt"), 0o644).unwrap_err();
        assert!(matches!(err, VfsError::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));
    }

    #[test]
    fn test_mkdir_and_readdir() {
        let (backend, _dir) = setup();
        backend.mkdir(Path::new("subdir"), 0o755).unwrap();
        backend.create(Path::new("subdir/file.txt"), 0o644).unwrap();
        backend.create(Path::new("root.txt"), 0o644).unwrap();

        let entries = backend.readdir(Path::new("")).unwrap();
        assert_eq!(
            entries,
            vec![DirEntry::file("root.txt"), DirEntry::directory("subdir")]
        );
    }

    #[test]
    fn test_read_only() {
        let (mut backend, _dir) = setup();
        backend.set_read_only(true);
        assert!(matches!(
            backend.create(Path::new("test.txt"), 0o644),
            Err(VfsError::ReadOnly)
        ));
    }

    #[test]
    fn test_path_escape_blocked() {
        let (backend, _dir) = setup();
        assert!(matches!(
            backend.read(Path::new("../../../etc/passwd"), 0, 100),
            Err(VfsError::PathEscapesRoot(_))
        ));
        assert!(matches!(
            backend.create(Path::new("missing/../../x"), 0o644),
            Err(VfsError::PathEscapesRoot(_))
        ));
    }

    #[test]
    fn test_symlink_outside_root_blocked() {
        let (backend, dir) = setup();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();

        assert!(matches!(
            backend.read(Path::new("escape/secret"), 0, 10),
            Err(VfsError::PathEscapesRoot(_))
        ));
    }

    #[test]
    fn test_symlink_and_readlink() {
        let (backend, _dir) = setup();
        backend.create(Path::new("target.txt"), 0o644).unwrap();
        backend
            .symlink(Path::new("link.txt"), Path::new("target.txt"))
            .unwrap();

        let target = backend.readlink(Path::new("link.txt")).unwrap();
        assert_eq!(target, Path::new("target.txt"));
        assert!(backend.getattr(Path::new("link.txt")).unwrap().is_symlink());
        assert!(backend.getattr(Path::new("target.txt")).unwrap().is_file());

        backend.write_all(Path::new("target.txt"), b"through the link").unwrap();
        assert_eq!(backend.read_all(Path::new("link.txt")).unwrap(), b"through the link");

        backend.unlink(Path::new("link.txt")).unwrap();
        assert!(!backend.exists(Path::new("link.txt")));
        assert!(backend.exists(Path::new("target.txt")));
    }

    #[test]
    fn test_link_out_of_root_is_not_followed_for_getattr() {
        let (backend, _dir) = setup();
        backend.symlink(Path::new("out"), Path::new("/")).unwrap();
        assert!(backend.getattr(Path::new("out")).unwrap().is_symlink());
        assert_eq!(backend.readlink(Path::new("out")).unwrap(), Path::new("/"));
        assert!(matches!(
            backend.read(Path::new("out"), 0, 10),
            Err(VfsError::PathEscapesRoot(_))
        ));
    }

    #[test]
    fn test_rename_and_truncate() {
        let (backend, _dir) = setup();
        backend.write_all(Path::new("old.txt"), b"hello world").unwrap();
        backend
            .rename(Path::new("old.txt"), Path::new("moved/new.txt"))
            .unwrap();
        assert!(backend.metadata(Path::new("old.txt")).unwrap().is_none());

        backend.truncate(Path::new("moved/new.txt"), 5).unwrap();
        assert_eq!(backend.read_all(Path::new("moved/new.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_statfs() {
        let (backend, _dir) = setup();
        let stat = backend.statfs().unwrap();
        assert!(stat.bsize > 0);
    }
}
