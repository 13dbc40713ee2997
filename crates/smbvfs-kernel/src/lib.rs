//! # smbvfs-kernel
//!
//! Virtual filesystem for an agents directory with NAS shares mounted in.
//!
//! The agents root is an ordinary local tree, except that
//! `nas_smb/<mount>/...` lives on a remote share:
//! - Mounts are configured in `nas_smb/secrets/.env`, which stays local
//! - Each mount is a directory whose contents come from the share
//! - `.mount.json` descriptors beside the mounts stay local
//!
//! [`AgentsVfs`] does the routing. Remote files are read and written whole
//! through [`NasSmbVfs`]; the paged streaming path lives in `smbvfs-media`
//! and reaches shares through the same facade.

pub mod handle;
pub mod nas_smb;
pub mod router;
pub mod vfs;

pub use handle::{FileHandle, VfsFileHandle, WholeFileHandle};
pub use nas_smb::{
    DisabledClient, EnvFileMounts, MemoryShareClient, MountConfig, MountsProvider, NasSmbClient,
    NasSmbError, NasSmbErrorCode, NasSmbResult, NasSmbVfs, StaticMounts,
};
pub use router::{AgentsVfs, Route};
pub use vfs::{
    backends::{LocalBackend, MemoryBackend},
    DirEntry, FileAttr, FileType, StatFs, VfsError, VfsOps, VfsResult,
};
