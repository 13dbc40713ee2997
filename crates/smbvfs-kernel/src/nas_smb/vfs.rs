//! Mount-aware facade over a share client.
//!
//! Callers address files by mount name and a mount-relative path. This
//! layer resolves the mount, joins its remote dir, refuses traversal and
//! enforces read-only mounts before anything reaches the client.

use std::sync::Arc;

use smbvfs_media::{BackendError, RemoteFile, RemoteFileOpener, SmbMediaError};
use tracing::debug;

use super::client::NasSmbClient;
use super::error::{NasSmbError, NasSmbResult};
use super::models::{MountConfig, RemoteMetadata};
use super::mounts::{MountMap, MountsProvider};
use crate::vfs::DirEntry;

/// Remote mounts as a path-addressed filesystem.
pub struct NasSmbVfs {
    mounts: Arc<dyn MountsProvider>,
    client: Arc<dyn NasSmbClient>,
}

impl NasSmbVfs {
    pub fn new(mounts: Arc<dyn MountsProvider>, client: Arc<dyn NasSmbClient>) -> Self {
        Self { mounts, client }
    }

    pub fn mounts_by_name(&self) -> NasSmbResult<MountMap> {
        self.mounts.mounts_by_name()
    }

    pub fn list_dir(&self, mount_name: &str, rel_dir: &str) -> NasSmbResult<Vec<DirEntry>> {
        let mount = self.resolve_mount(mount_name)?;
        let remote = to_remote_path(&mount, rel_dir, true)?;
        self.client.list_dir(&mount, &remote)
    }

    pub fn metadata_or_null(
        &self,
        mount_name: &str,
        rel_path: &str,
    ) -> NasSmbResult<Option<RemoteMetadata>> {
        let mount = self.resolve_mount(mount_name)?;
        let remote = to_remote_path(&mount, rel_path, false)?;
        self.client.metadata_or_null(&mount, &remote)
    }

    pub fn read_bytes(&self, mount_name: &str, rel_path: &str, max_bytes: u64) -> NasSmbResult<Vec<u8>> {
        let mount = self.resolve_mount(mount_name)?;
        let remote = to_remote_path(&mount, rel_path, false)?;
        self.client.read_bytes(&mount, &remote, max_bytes)
    }

    pub fn write_bytes(&self, mount_name: &str, rel_path: &str, data: &[u8]) -> NasSmbResult<()> {
        let mount = self.writable_mount(mount_name)?;
        let remote = to_remote_path(&mount, rel_path, false)?;
        debug!(mount = %mount.mount_name, bytes = data.len(), "remote write");
        self.client.write_bytes(&mount, &remote, data)
    }

    /// Read a file as UTF-8; invalid sequences are replaced.
    pub fn read_text_file(&self, mount_name: &str, rel_path: &str, max_bytes: u64) -> NasSmbResult<String> {
        let bytes = self.read_bytes(mount_name, rel_path, max_bytes)?;
        Ok(String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }

    pub fn write_text_file(&self, mount_name: &str, rel_path: &str, content: &str) -> NasSmbResult<()> {
        self.write_bytes(mount_name, rel_path, content.as_bytes())
    }

    pub fn mkdirs(&self, mount_name: &str, rel_dir: &str) -> NasSmbResult<()> {
        let mount = self.writable_mount(mount_name)?;
        let remote = to_remote_path(&mount, rel_dir, true)?;
        self.client.mkdirs(&mount, &remote)
    }

    pub fn delete(&self, mount_name: &str, rel_path: &str, recursive: bool) -> NasSmbResult<()> {
        let mount = self.writable_mount(mount_name)?;
        let remote = to_remote_path(&mount, rel_path, false)?;
        self.client.delete(&mount, &remote, recursive)
    }

    pub fn move_path(
        &self,
        mount_name: &str,
        from_rel: &str,
        to_rel: &str,
        overwrite: bool,
    ) -> NasSmbResult<()> {
        let mount = self.writable_mount(mount_name)?;
        let from = to_remote_path(&mount, from_rel, false)?;
        let to = to_remote_path(&mount, to_rel, false)?;
        self.client.move_path(&mount, &from, &to, overwrite)
    }

    /// Open a file for positional reads.
    pub fn open_file(&self, mount_name: &str, rel_path: &str) -> NasSmbResult<Box<dyn RemoteFile>> {
        let mount = self.resolve_mount(mount_name)?;
        let remote = to_remote_path(&mount, rel_path, false)?;
        self.client.open_file(&mount, &remote)
    }

    fn resolve_mount(&self, mount_name: &str) -> NasSmbResult<Arc<MountConfig>> {
        let key = mount_name.trim().to_lowercase();
        self.mounts
            .mounts_by_name()?
            .remove(&key)
            .ok_or_else(|| NasSmbError::invalid_config(format!("unknown mount: '{mount_name}'")))
    }

    fn writable_mount(&self, mount_name: &str) -> NasSmbResult<Arc<MountConfig>> {
        let mount = self.resolve_mount(mount_name)?;
        if mount.read_only {
            return Err(NasSmbError::permission_denied(format!(
                "mount is read-only: {}",
                mount.mount_name
            )));
        }
        Ok(mount)
    }
}

/// Streams read through the mount rules, with failures sanitized.
impl RemoteFileOpener for NasSmbVfs {
    fn open(&self, mount_name: &str, rel_path: &str) -> Result<Box<dyn RemoteFile>, BackendError> {
        self.open_file(mount_name, rel_path).map_err(|e| {
            let mapped = SmbMediaError::from(&e);
            debug!(code = %e.code, "remote open failed");
            BackendError::Mapped(mapped)
        })
    }
}

/// Normalize a mount-relative path: both separators, no empty segments,
/// and no `.` or `..`.
pub fn normalize_rel(rel: &str) -> NasSmbResult<String> {
    let raw = rel.trim();
    let segs: Vec<&str> = raw.split(['/', '\\']).filter(|s| !s.trim().is_empty()).collect();
    if segs.iter().any(|s| *s == "." || *s == "..") {
        return Err(NasSmbError::invalid_config("path traversal is not allowed"));
    }
    Ok(segs.join("/"))
}

/// Join a mount's remote dir with a mount-relative path.
///
/// A file operation on the mount root itself is refused.
pub fn to_remote_path(mount: &MountConfig, rel: &str, expect_dir: bool) -> NasSmbResult<String> {
    let rel = normalize_rel(rel)?;
    if !expect_dir && rel.is_empty() {
        return Err(NasSmbError::invalid_config(format!(
            "refusing to treat mount root as a file: {}",
            mount.mount_name
        )));
    }
    let base = mount.remote_dir.trim().trim_matches('/');
    Ok(match (base.is_empty(), rel.is_empty()) {
        (true, _) => rel,
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{rel}"),
    })
}

/// Backslash-separated form a share protocol expects.
pub fn to_share_path(remote: &str) -> String {
    remote
        .trim()
        .replace('\\', "/")
        .trim_matches('/')
        .replace('/', "\\")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nas_smb::{MemoryShareClient, NasSmbErrorCode, StaticMounts};
    use smbvfs_media::{SmbMediaErrorCode, mapper};

    fn setup() -> (NasSmbVfs, Arc<MemoryShareClient>) {
        let client = Arc::new(MemoryShareClient::new());
        let mounts = StaticMounts::new([
            MountConfig::guest("home", "users").with_remote_dir("alice"),
            MountConfig::guest("archive", "users").with_read_only(true),
        ]);
        (NasSmbVfs::new(Arc::new(mounts), client.clone()), client)
    }

    #[test]
    fn paths_join_remote_dir() {
        let (vfs, client) = setup();
        vfs.write_text_file("HOME", "notes/todo.txt", "milk").unwrap();
        assert_eq!(
            client.read_bytes(&MountConfig::guest("x", "users"), "alice/notes/todo.txt", 100)
                .unwrap(),
            b"milk"
        );
        // Same share, different remote dir
        assert_eq!(
            vfs.read_text_file("archive", "alice/notes/todo.txt", 100).unwrap(),
            "milk"
        );
        let names: Vec<_> = vfs.list_dir("home", "").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["notes"]);
    }

    #[test]
    fn unknown_mount_and_traversal() {
        let (vfs, _) = setup();
        assert_eq!(
            vfs.metadata_or_null("nope", "a").unwrap_err().code,
            NasSmbErrorCode::InvalidConfig
        );
        assert_eq!(
            vfs.read_bytes("home", "../bob/secret", 10).unwrap_err().code,
            NasSmbErrorCode::InvalidConfig
        );
        assert_eq!(
            vfs.read_bytes("home", "a/./b", 10).unwrap_err().code,
            NasSmbErrorCode::InvalidConfig
        );
    }

    #[test]
    fn mount_root_is_not_a_file() {
        let (vfs, _) = setup();
        let err = vfs.write_bytes("home", "/", b"x").unwrap_err();
        assert_eq!(err.code, NasSmbErrorCode::InvalidConfig);

        // The remote dir has to exist on the share before it can be listed
        assert!(vfs.list_dir("home", "/").is_err());
        vfs.mkdirs("home", "movies").unwrap();
        let names: Vec<_> = vfs.list_dir("home", "/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["movies"]);
    }

    #[test]
    fn read_only_mounts_reject_writes() {
        let (vfs, _) = setup();
        for err in [
            vfs.write_bytes("archive", "a", b"x").unwrap_err(),
            vfs.mkdirs("archive", "d").unwrap_err(),
            vfs.delete("archive", "a", false).unwrap_err(),
            vfs.move_path("archive", "a", "b", true).unwrap_err(),
        ] {
            assert_eq!(err.code, NasSmbErrorCode::PermissionDenied);
        }
    }

    #[test]
    fn share_paths() {
        assert_eq!(to_share_path("/a/b/c.txt/"), "a\\b\\c.txt");
        assert_eq!(to_share_path("a\\b"), "a\\b");
        assert_eq!(to_share_path(""), "");
        assert_eq!(normalize_rel(" \\a//b/ ").unwrap(), "a/b");
    }

    #[test]
    fn opener_sanitizes_failures() {
        let (vfs, client) = setup();
        let err = vfs.open("home", "missing.mkv").err().unwrap();
        assert_eq!(mapper::to_error(&err).code(), SmbMediaErrorCode::FileNotFound);

        client.set_offline(true);
        let err = vfs.open("home", "missing.mkv").err().unwrap();
        assert_eq!(mapper::to_error(&err).code(), SmbMediaErrorCode::HostUnreachable);
    }
}
