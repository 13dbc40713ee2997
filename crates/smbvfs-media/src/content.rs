//! Ticket-gated content resolution.
//!
//! Ties the pieces together for a host that hands media to another process:
//! `share` turns a remote virtual path into an opaque locator, `query`
//! answers metadata for a locator, and `open` produces a [`MediaStream`]
//! whose every read re-checks the ticket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::agents_path::VirtualPath;
use crate::config::StreamConfig;
use crate::error::{ConfigError, SmbMediaError, StreamError, TicketError, UriError};
use crate::mime::{OCTET_STREAM, mime_from_file_name};
use crate::page_cache::PageCache;
use crate::source::{BackendSource, RandomAccessSource, RemoteFileOpener};
use crate::ticket::{CallerIdentity, Ticket, TicketSpec, TicketStore, short_token};
use crate::uri::MediaUriBuilder;

/// Content resolution failures.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("not a media locator for this authority")]
    BadLocator,

    #[error("path is not a file on a remote mount")]
    NotRemote,

    #[error(transparent)]
    Uri(#[from] UriError),

    #[error(transparent)]
    Ticket(#[from] TicketError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<SmbMediaError> for ContentError {
    fn from(e: SmbMediaError) -> Self {
        Self::Stream(StreamError::Remote(e))
    }
}

impl ContentError {
    pub fn errno(&self) -> i32 {
        match self {
            Self::BadLocator | Self::NotRemote => libc::ENOENT,
            Self::Uri(_) | Self::Config(_) => libc::EINVAL,
            Self::Ticket(TicketError::CallerMismatch) => libc::EACCES,
            Self::Ticket(_) => libc::ENOENT,
            Self::Stream(e) => e.errno(),
        }
    }
}

/// A shared file: the locator to hand out and its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    pub locator: String,
    pub mime: String,
}

/// Metadata answered for a locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub display_name: String,
    pub size_bytes: u64,
    pub mime: String,
}

/// Issues locators and serves streams for remote media.
pub struct MediaContentService<I> {
    tickets: Arc<TicketStore<I>>,
    opener: Arc<dyn RemoteFileOpener>,
    uris: MediaUriBuilder,
    config: StreamConfig,
}

impl<I: CallerIdentity> MediaContentService<I> {
    pub fn new(
        tickets: Arc<TicketStore<I>>,
        opener: Arc<dyn RemoteFileOpener>,
        config: StreamConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tickets,
            opener,
            uris: MediaUriBuilder::new(config.authority.clone()),
            config,
        })
    }

    pub fn tickets(&self) -> &Arc<TicketStore<I>> {
        &self.tickets
    }

    pub fn uris(&self) -> &MediaUriBuilder {
        &self.uris
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Issue a ticket for a remote file and build its locator.
    ///
    /// `agents_path` is agents-relative (`.agents/nas_smb/<mount>/<rel>`).
    pub fn share(&self, agents_path: &str, display_name: &str) -> Result<ContentRef, ContentError> {
        let path = VirtualPath::parse_file(agents_path).ok_or(ContentError::NotRemote)?;
        let mime = mime_from_file_name(display_name)
            .or_else(|| path.file_name().and_then(mime_from_file_name))
            .unwrap_or(OCTET_STREAM);

        let ticket = self.tickets.issue(TicketSpec {
            mount_name: path.mount_name,
            remote_path: path.rel_path,
            mime: mime.to_string(),
            size_bytes: None,
        });
        let locator = match self.uris.build(&ticket.token, display_name) {
            Ok(locator) => locator,
            Err(e) => {
                self.tickets.revoke(&ticket.token);
                return Err(e.into());
            }
        };
        Ok(ContentRef {
            locator,
            mime: mime.to_string(),
        })
    }

    fn resolve(&self, locator: &str, caller: &I) -> Result<(String, Ticket<I>), ContentError> {
        let token = self
            .uris
            .parse_token(locator)
            .ok_or(ContentError::BadLocator)?;
        let ticket = self.tickets.resolve(&token, caller)?;
        Ok((token, ticket))
    }

    /// Metadata for a locator. Opens the file once when the size is unknown.
    pub fn query(&self, locator: &str, caller: &I) -> Result<MediaInfo, ContentError> {
        let (_, ticket) = self.resolve(locator, caller)?;
        let size_bytes = match ticket.spec.size_bytes {
            Some(size) => size,
            None => {
                let mut source = BackendSource::open(
                    self.opener.as_ref(),
                    &ticket.spec.mount_name,
                    &ticket.spec.remote_path,
                )?;
                let size = source.size();
                source.close();
                size
            }
        };
        let display_name = self
            .uris
            .display_name(locator)
            .unwrap_or_else(|| crate::uri::FALLBACK_DISPLAY_NAME.to_string());
        Ok(MediaInfo {
            display_name,
            size_bytes,
            mime: ticket.spec.mime,
        })
    }

    /// Open a read-only stream for a locator.
    pub fn open(&self, locator: &str, caller: &I) -> Result<MediaStream<I>, ContentError> {
        let (token, ticket) = self.resolve(locator, caller)?;
        let source = BackendSource::open(
            self.opener.as_ref(),
            &ticket.spec.mount_name,
            &ticket.spec.remote_path,
        )?;
        let cache = PageCache::from_config(source, &self.config)?;
        debug!(token = short_token(&token), size = cache.size(), "media stream opened");
        Ok(MediaStream {
            token,
            caller: caller.clone(),
            tickets: self.tickets.clone(),
            cache,
            mime: ticket.spec.mime,
            released: AtomicBool::new(false),
        })
    }
}

/// An open, ticket-gated, cached stream over one remote file.
pub struct MediaStream<I> {
    token: String,
    caller: I,
    tickets: Arc<TicketStore<I>>,
    cache: PageCache<BackendSource>,
    mime: String,
    released: AtomicBool,
}

impl<I: CallerIdentity> MediaStream<I> {
    /// Read up to `len` bytes at `offset`, re-validating the ticket first.
    pub fn read(&self, offset: u64, len: usize) -> Result<Bytes, ContentError> {
        if self.released.load(Ordering::Acquire) {
            return Err(StreamError::Closed.into());
        }
        self.tickets.resolve(&self.token, &self.caller)?;
        Ok(self.cache.read(offset, len)?)
    }

    /// Size of the remote file, taken once at open.
    pub fn size(&self) -> u64 {
        self.cache.size()
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// The page cache behind this stream, for stats.
    pub fn cache(&self) -> &PageCache<BackendSource> {
        &self.cache
    }

    /// Close the remote file and drop cached pages. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cache.close();
        debug!(token = short_token(&self.token), "media stream released");
    }
}

impl<I> std::fmt::Debug for MediaStream<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("token", &short_token(&self.token))
            .field("mime", &self.mime)
            .field("cache", &self.cache)
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<I> Drop for MediaStream<I> {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.cache.close();
        }
    }
}
