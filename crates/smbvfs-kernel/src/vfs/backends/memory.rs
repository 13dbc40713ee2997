//! In-memory filesystem backend.
//!
//! Backs in-process shares and tests. All data is ephemeral.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::VfsOps;
use crate::vfs::types::{DirEntry, FileAttr, FileType, StatFs};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, attr: FileAttr },
    Directory { attr: FileAttr },
    Symlink { target: PathBuf, attr: FileAttr },
}

impl Entry {
    fn attr(&self) -> &FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
            Entry::Symlink { attr, .. } => attr,
        }
    }

    fn kind(&self) -> FileType {
        self.attr().kind
    }
}

type Entries = HashMap<PathBuf, Entry>;

/// In-memory filesystem backend.
///
/// Thread-safe via an internal `RwLock`. All data is lost when dropped.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<Entries>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            PathBuf::new(),
            Entry::Directory {
                attr: FileAttr::directory(0o755),
            },
        );
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Normalize a path: remove leading `/`, resolve `.` and `..`.
    fn normalize(path: &Path) -> PathBuf {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                Component::ParentDir => {
                    result.pop();
                }
                Component::Normal(s) => result.push(s),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        result
    }

    /// Create missing parent directories. An ancestor that is not a
    /// directory is an error.
    fn ensure_parents(entries: &mut Entries, path: &Path) -> VfsResult<()> {
        let mut current = PathBuf::new();
        for component in path.parent().into_iter().flat_map(|p| p.components()) {
            if let Component::Normal(s) = component {
                current.push(s);
                match entries.get(&current) {
                    Some(Entry::Directory { .. }) => {}
                    Some(_) => return Err(VfsError::not_a_directory(Self::path_str(&current))),
                    None => {
                        entries.insert(
                            current.clone(),
                            Entry::Directory {
                                attr: FileAttr::directory(0o755),
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn path_str(path: &Path) -> String {
        path.display().to_string()
    }

    fn has_children(entries: &Entries, dir: &Path) -> bool {
        entries.keys().any(|k| k.parent() == Some(dir) && k != dir)
    }

    /// Remove `path` and, for a directory, everything beneath it.
    pub fn remove_all(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        if normalized.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let mut entries = self.entries.write();
        if entries.remove(&normalized).is_none() {
            return Err(VfsError::not_found(Self::path_str(&normalized)));
        }
        entries.retain(|k, _| !k.starts_with(&normalized));
        Ok(())
    }

    /// Total bytes held in file entries.
    pub fn used_bytes(&self) -> u64 {
        self.entries
            .read()
            .values()
            .map(|e| match e {
                Entry::File { data, .. } => data.len() as u64,
                _ => 0,
            })
            .sum()
    }
}

impl VfsOps for MemoryBackend {
    fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        self.entries
            .read()
            .get(&normalized)
            .map(|e| e.attr().clone())
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))
    }

    fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read();

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(VfsError::not_a_directory(Self::path_str(&normalized))),
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(normalized.as_path()) && **p != normalized)
            .filter_map(|(p, e)| {
                p.file_name()
                    .map(|name| DirEntry::new(name.to_string_lossy(), e.kind()))
            })
            .collect();

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn read(&self, path: &Path, offset: u64, size: usize) -> VfsResult<Vec<u8>> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read();

        match entries.get(&normalized) {
            Some(Entry::File { data, .. }) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
                let end = start.saturating_add(size).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(Entry::Symlink { .. }) => Err(VfsError::other("cannot read symlink as file")),
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    fn readlink(&self, path: &Path) -> VfsResult<PathBuf> {
        let normalized = Self::normalize(path);
        match self.entries.read().get(&normalized) {
            Some(Entry::Symlink { target, .. }) => Ok(target.clone()),
            Some(_) => Err(VfsError::NotASymlink(Self::path_str(&normalized))),
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<usize> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();

        match entries.get_mut(&normalized) {
            Some(Entry::File {
                data: file_data,
                attr,
            }) => {
                let start = usize::try_from(offset)
                    .map_err(|_| VfsError::invalid_path("offset out of range"))?;
                let end = start
                    .checked_add(data.len())
                    .ok_or_else(|| VfsError::invalid_path("offset out of range"))?;
                if end > file_data.len() {
                    file_data.resize(end, 0);
                }
                file_data[start..end].copy_from_slice(data);
                attr.size = file_data.len() as u64;
                attr.mtime = SystemTime::now();
                Ok(data.len())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(Entry::Symlink { .. }) => Err(VfsError::other("cannot write to symlink")),
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();
        Self::ensure_parents(&mut entries, &normalized)?;

        if entries.contains_key(&normalized) {
            return Err(VfsError::already_exists(Self::path_str(&normalized)));
        }

        let attr = FileAttr::file(0, mode);
        entries.insert(
            normalized,
            Entry::File {
                data: Vec::new(),
                attr: attr.clone(),
            },
        );
        Ok(attr)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();
        Self::ensure_parents(&mut entries, &normalized)?;

        if let Some(existing) = entries.get(&normalized) {
            return match existing {
                Entry::Directory { attr } => Ok(attr.clone()),
                _ => Err(VfsError::already_exists(Self::path_str(&normalized))),
            };
        }

        let attr = FileAttr::directory(mode);
        entries.insert(normalized, Entry::Directory { attr: attr.clone() });
        Ok(attr)
    }

    fn unlink(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(_) => {
                entries.remove(&normalized);
                Ok(())
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    fn rmdir(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        if normalized.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let mut entries = self.entries.write();
        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(VfsError::not_a_directory(Self::path_str(&normalized))),
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        if Self::has_children(&entries, &normalized) {
            return Err(VfsError::directory_not_empty(Self::path_str(&normalized)));
        }

        entries.remove(&normalized);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from_normalized = Self::normalize(from);
        let to_normalized = Self::normalize(to);
        if from_normalized == to_normalized {
            return Ok(());
        }
        if from_normalized.as_os_str().is_empty() || to_normalized.starts_with(&from_normalized) {
            return Err(VfsError::invalid_path(Self::path_str(&to_normalized)));
        }

        let mut entries = self.entries.write();
        if !entries.contains_key(&from_normalized) {
            return Err(VfsError::not_found(Self::path_str(&from_normalized)));
        }
        if let Some(Entry::Directory { .. }) = entries.get(&to_normalized) {
            if Self::has_children(&entries, &to_normalized) {
                return Err(VfsError::directory_not_empty(Self::path_str(&to_normalized)));
            }
        }
        Self::ensure_parents(&mut entries, &to_normalized)?;

        let Some(entry) = entries.remove(&from_normalized) else {
            return Err(VfsError::not_found(Self::path_str(&from_normalized)));
        };

        // Directories carry their subtree along
        if matches!(entry, Entry::Directory { .. }) {
            let children: Vec<PathBuf> = entries
                .keys()
                .filter(|k| k.starts_with(&from_normalized))
                .cloned()
                .collect();
            for child in children {
                if let (Some(child_entry), Ok(relative)) =
                    (entries.remove(&child), child.strip_prefix(&from_normalized))
                {
                    entries.insert(to_normalized.join(relative), child_entry);
                }
            }
        }

        entries.insert(to_normalized, entry);
        Ok(())
    }

    fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let len = usize::try_from(size)
            .map_err(|_| VfsError::FileTooLarge { size, limit: usize::MAX as u64 })?;
        let mut entries = self.entries.write();

        match entries.get_mut(&normalized) {
            Some(Entry::File { data, attr }) => {
                data.resize(len, 0);
                attr.size = size;
                attr.mtime = SystemTime::now();
                Ok(())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(Entry::Symlink { .. }) => Err(VfsError::other("cannot truncate symlink")),
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    fn symlink(&self, path: &Path, target: &Path) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();
        Self::ensure_parents(&mut entries, &normalized)?;

        if entries.contains_key(&normalized) {
            return Err(VfsError::already_exists(Self::path_str(&normalized)));
        }

        let attr = FileAttr::symlink(target.as_os_str().len() as u64);
        entries.insert(
            normalized,
            Entry::Symlink {
                target: target.to_path_buf(),
                attr: attr.clone(),
            },
        );
        Ok(attr)
    }

    fn read_only(&self) -> bool {
        false
    }

    fn statfs(&self) -> VfsResult<StatFs> {
        Ok(StatFs::default())
    }
}
