//! # smbvfs-media
//!
//! Streaming access to files on remote NAS mounts.
//!
//! A host that wants another process to play a remote file does not hand
//! out paths. It issues a ticket, builds an opaque locator from the ticket
//! token, and serves range reads for that locator through a paged cache:
//!
//! - [`ticket`] - capability tickets with first-use caller binding and an
//!   idle TTL
//! - [`uri`] - `content://<authority>/v1/<token>/<name>` locators
//! - [`page_cache`] - fixed-page LRU cache with a byte budget
//! - [`source`] - random-access sources and the remote-file adapter
//! - [`mapper`] - remote failures reduced to fixed, sanitized codes
//! - [`content`] - the share / query / open service that ties them together

pub mod agents_path;
pub mod clock;
pub mod config;
pub mod content;
pub mod error;
pub mod mapper;
pub mod mime;
pub mod page_cache;
pub mod source;
pub mod ticket;
pub mod uri;

pub use agents_path::VirtualPath;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StreamConfig;
pub use content::{ContentError, ContentRef, MediaContentService, MediaInfo, MediaStream};
pub use error::{
    BackendError, ConfigError, FailureClass, SmbMediaError, SmbMediaErrorCode, StreamError,
    StreamResult, TicketError, UriError,
};
pub use page_cache::{CacheStats, PageCache};
pub use source::{BackendSource, RandomAccessSource, RemoteFile, RemoteFileOpener};
pub use ticket::{CallerIdentity, Ticket, TicketSpec, TicketStore};
pub use uri::MediaUriBuilder;
