//! Sources of mount configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use smbvfs_media::agents_path::{NAS_SMB_DIR, SECRETS_DIR};
use tracing::{debug, info};

use super::config::load_from_env_text;
use super::error::NasSmbResult;
use super::models::MountConfig;
use crate::vfs::VfsOps;

/// Mounts keyed by lowercased mount name.
pub type MountMap = HashMap<String, Arc<MountConfig>>;

/// Supplies the current set of mounts.
pub trait MountsProvider: Send + Sync {
    fn mounts_by_name(&self) -> NasSmbResult<MountMap>;
}

fn index(mounts: impl IntoIterator<Item = MountConfig>) -> MountMap {
    mounts
        .into_iter()
        .map(|m| (m.mount_name.to_lowercase(), Arc::new(m)))
        .collect()
}

/// A fixed set of mounts.
#[derive(Debug, Default)]
pub struct StaticMounts {
    mounts: MountMap,
}

impl StaticMounts {
    pub fn new(mounts: impl IntoIterator<Item = MountConfig>) -> Self {
        Self {
            mounts: index(mounts),
        }
    }
}

impl MountsProvider for StaticMounts {
    fn mounts_by_name(&self) -> NasSmbResult<MountMap> {
        Ok(self.mounts.clone())
    }
}

/// Mounts read from `nas_smb/secrets/.env` on every call.
///
/// The file is read through a [`VfsOps`] rooted at the agents directory.
/// A missing, unreadable or blank file yields no mounts; a file that parses
/// but describes a bad mount is an error.
pub struct EnvFileMounts {
    fs: Arc<dyn VfsOps>,
    env_path: PathBuf,
    last_names: Mutex<Option<Vec<String>>>,
}

impl EnvFileMounts {
    /// Path of the env file relative to the agents root.
    pub fn default_env_path() -> PathBuf {
        Path::new(NAS_SMB_DIR).join(SECRETS_DIR).join(".env")
    }

    pub fn new(fs: Arc<dyn VfsOps>) -> Self {
        Self::with_path(fs, Self::default_env_path())
    }

    pub fn with_path(fs: Arc<dyn VfsOps>, env_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            env_path: env_path.into(),
            last_names: Mutex::new(None),
        }
    }

    fn read_text(&self) -> Option<String> {
        match self.fs.read_all(&self.env_path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                debug!(error = %e, "no readable mount config");
                None
            }
        }
    }
}

impl MountsProvider for EnvFileMounts {
    fn mounts_by_name(&self) -> NasSmbResult<MountMap> {
        let Some(text) = self.read_text().filter(|t| !t.trim().is_empty()) else {
            return Ok(MountMap::new());
        };
        let mounts = index(load_from_env_text(&text)?);

        let mut names: Vec<String> = mounts.keys().cloned().collect();
        names.sort();
        let mut last = self.last_names.lock();
        if last.as_ref() != Some(&names) {
            info!(count = names.len(), mounts = ?names, "nas_smb mounts loaded");
            *last = Some(names);
        }
        Ok(mounts)
    }
}
