//! VFS operations trait.
//!
//! Path-based, no inodes, explicit offset and size on every read and write.

use std::path::{Path, PathBuf};

use super::VfsResult;
use super::error::VfsError;
use super::types::{DirEntry, FileAttr, StatFs};

/// Core VFS operations trait.
///
/// Paths are relative to the backend's root. Calls block the caller; the
/// remote backends behind an implementation do their own I/O.
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get file attributes.
    fn getattr(&self, path: &Path) -> VfsResult<FileAttr>;

    /// Read directory entries, sorted by name.
    fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Read up to `size` bytes starting at `offset`.
    /// Returns fewer bytes if EOF is reached.
    fn read(&self, path: &Path, offset: u64, size: usize) -> VfsResult<Vec<u8>>;

    /// Read symbolic link target.
    fn readlink(&self, path: &Path) -> VfsResult<PathBuf>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write `data` at `offset`. Returns the number of bytes written.
    fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<usize>;

    /// Create a new, empty file. Fails if the path exists.
    fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr>;

    /// Create a directory (and missing parents).
    fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr>;

    /// Remove a file.
    fn unlink(&self, path: &Path) -> VfsResult<()>;

    /// Remove an empty directory.
    fn rmdir(&self, path: &Path) -> VfsResult<()>;

    /// Rename a file or directory, replacing the target.
    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    /// Truncate or extend a file to `size`.
    fn truncate(&self, path: &Path, size: u64) -> VfsResult<()>;

    /// Create a symlink at `path` pointing to `target`.
    fn symlink(&self, path: &Path, target: &Path) -> VfsResult<FileAttr>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Returns true if this filesystem is read-only.
    fn read_only(&self) -> bool;

    /// Get filesystem statistics.
    fn statfs(&self) -> VfsResult<StatFs>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Attributes, or `None` when nothing is at `path`.
    fn metadata(&self, path: &Path) -> VfsResult<Option<FileAttr>> {
        match self.getattr(path) {
            Ok(attr) => Ok(Some(attr)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool {
        self.getattr(path).is_ok()
    }

    /// Read entire file contents.
    fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let attr = self.getattr(path)?;
        // A link's own size is the length of its target path
        if attr.is_symlink() {
            return self.read(path, 0, usize::MAX);
        }
        let size = usize::try_from(attr.size).map_err(|_| VfsError::FileTooLarge {
            size: attr.size,
            limit: usize::MAX as u64,
        })?;
        self.read(path, 0, size)
    }

    /// Replace the file's contents, creating it if needed.
    fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        if self.exists(path) {
            self.truncate(path, 0)?;
        } else {
            self.create(path, 0o644)?;
        }
        self.write(path, 0, data)?;
        Ok(())
    }
}
