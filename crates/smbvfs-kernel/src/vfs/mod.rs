//! Virtual filesystem abstraction.
//!
//! - [`VfsOps`] - core trait for filesystem operations
//! - [`MemoryBackend`] - in-memory filesystem (in-process shares, testing)
//! - [`LocalBackend`] - local filesystem access (with path security)
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: operations take paths relative to the
//!   backend root.
//! - **Explicit offset/size**: reads and writes carry their own position,
//!   so no handle state lives in a backend.
//! - **Blocking**: every call completes before returning. Callers that
//!   need concurrency run calls on their own threads.

pub mod backends;
mod error;
mod ops;
mod types;

pub use backends::{LocalBackend, MemoryBackend};
pub use error::{VfsError, VfsResult};
pub use ops::VfsOps;
pub use types::{DirEntry, FileAttr, FileType, StatFs};
