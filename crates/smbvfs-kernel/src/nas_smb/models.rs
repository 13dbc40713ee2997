//! Remote mount data types.

use std::fmt;
use std::time::SystemTime;

use secrecy::SecretString;

use crate::vfs::{FileAttr, FileType};

/// Default SMB port.
pub const DEFAULT_PORT: u16 = 445;

/// Metadata a share reports for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub kind: FileType,
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
}

impl RemoteMetadata {
    pub fn file(size: u64) -> Self {
        Self {
            kind: FileType::File,
            size: Some(size),
            modified: None,
        }
    }

    pub fn directory() -> Self {
        Self {
            kind: FileType::Directory,
            size: None,
            modified: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn to_attr(&self) -> FileAttr {
        FileAttr::remote(self.kind, self.size.unwrap_or(0), self.modified)
    }
}

/// One configured remote mount.
///
/// `Debug` leaves out the host, share and credentials; use the accessors
/// when a client actually connects.
pub struct MountConfig {
    /// Lowercased id from `NAS_SMB_MOUNTS`.
    pub id: String,
    /// Directory name under `nas_smb/`.
    pub mount_name: String,
    pub host: String,
    pub port: u16,
    pub domain: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub share: String,
    /// Share-relative directory, `/`-separated, no leading slash. Root is "".
    pub remote_dir: String,
    pub guest: bool,
    pub read_only: bool,
}

impl MountConfig {
    /// A guest mount with defaults, for tests and in-process shares.
    pub fn guest(mount_name: impl Into<String>, share: impl Into<String>) -> Self {
        let mount_name = mount_name.into();
        Self {
            id: mount_name.clone(),
            mount_name,
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            domain: None,
            username: None,
            password: None,
            share: share.into(),
            remote_dir: String::new(),
            guest: true,
            read_only: false,
        }
    }

    pub fn with_remote_dir(mut self, remote_dir: impl Into<String>) -> Self {
        self.remote_dir = remote_dir.into();
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

impl fmt::Debug for MountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountConfig")
            .field("id", &self.id)
            .field("mount_name", &self.mount_name)
            .field("remote_dir", &self.remote_dir)
            .field("guest", &self.guest)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}
