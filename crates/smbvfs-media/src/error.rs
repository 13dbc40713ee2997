//! Media streaming error types.
//!
//! Remote failures are reduced to a closed [`SmbMediaErrorCode`] whose message
//! comes from a fixed phrase table, so an [`SmbMediaError`] never carries text
//! that originated on the remote side. Everything else here describes local
//! contract violations (bad ranges, closed sources, expired tickets, bad config).

use std::io;

use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

/// Closed set of user-facing remote failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
pub enum SmbMediaErrorCode {
    Timeout,
    HostUnreachable,
    AuthFailed,
    PermissionDenied,
    ShareNotFound,
    FileNotFound,
    ConnectionReset,
    BufferUnderrun,
    Unknown,
}

impl SmbMediaErrorCode {
    /// Fixed user-facing phrase for this code.
    ///
    /// Lowercase letters and spaces only.
    pub fn message(self) -> &'static str {
        match self {
            Self::Timeout => "the remote share did not respond in time",
            Self::HostUnreachable => "the remote host is unreachable",
            Self::AuthFailed => "authentication with the remote share failed",
            Self::PermissionDenied => "access to the remote file was denied",
            Self::ShareNotFound => "the remote share was not found",
            Self::FileNotFound => "the remote file was not found",
            Self::ConnectionReset => "the connection to the remote share was reset",
            Self::BufferUnderrun => "media data did not arrive fast enough",
            Self::Unknown => "the remote share request failed",
        }
    }

    /// POSIX errno a file-descriptor host should surface for this code.
    pub fn errno(self) -> i32 {
        match self {
            Self::Timeout => libc::ETIMEDOUT,
            Self::HostUnreachable => libc::EHOSTUNREACH,
            Self::AuthFailed | Self::PermissionDenied => libc::EACCES,
            Self::ShareNotFound | Self::FileNotFound => libc::ENOENT,
            Self::ConnectionReset => libc::ECONNRESET,
            Self::BufferUnderrun | Self::Unknown => libc::EIO,
        }
    }
}

/// A sanitized remote failure.
///
/// Constructed only from a code; the message is always the code's phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{msg} ({code})", msg = .code.message())]
pub struct SmbMediaError {
    code: SmbMediaErrorCode,
}

impl SmbMediaError {
    pub fn new(code: SmbMediaErrorCode) -> Self {
        Self { code }
    }

    pub fn code(&self) -> SmbMediaErrorCode {
        self.code
    }

    pub fn message(&self) -> &'static str {
        self.code.message()
    }
}

impl From<SmbMediaErrorCode> for SmbMediaError {
    fn from(code: SmbMediaErrorCode) -> Self {
        Self::new(code)
    }
}

/// Coarse failure class a backend can attach to an error.
///
/// The mapper consults the class before it looks at any message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Timeout,
    Transport,
    BufferUnderrun,
    Unclassified,
}

/// Raw failure raised by a remote-file backend.
///
/// Messages here may contain hosts, paths or protocol detail; they are
/// classified by [`crate::mapper`] and never shown to users.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("buffer underrun: {0}")]
    BufferUnderrun(String),

    #[error("{0}")]
    Other(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Already sanitized; passes through the mapper unchanged.
    #[error(transparent)]
    Mapped(#[from] SmbMediaError),
}

impl BackendError {
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Failure class, including the class implied by an I/O error kind.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Timeout(_) => FailureClass::Timeout,
            Self::Transport(_) => FailureClass::Transport,
            Self::BufferUnderrun(_) => FailureClass::BufferUnderrun,
            Self::Io(e) => match e.kind() {
                io::ErrorKind::TimedOut => FailureClass::Timeout,
                io::ErrorKind::HostUnreachable
                | io::ErrorKind::NetworkUnreachable
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::NotConnected
                | io::ErrorKind::AddrNotAvailable => FailureClass::Transport,
                _ => FailureClass::Unclassified,
            },
            Self::Other(_) | Self::Mapped(_) => FailureClass::Unclassified,
        }
    }
}

/// Errors returned by range reads against a source or a page cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error(transparent)]
    Remote(#[from] SmbMediaError),

    /// `offset + len` does not fit in a u64.
    #[error("invalid range: offset {offset} + length {len} overflows")]
    InvalidRange { offset: u64, len: usize },

    #[error("source is closed")]
    Closed,
}

impl StreamError {
    pub fn errno(&self) -> i32 {
        match self {
            Self::Remote(e) => e.code().errno(),
            Self::InvalidRange { .. } => libc::EINVAL,
            Self::Closed => libc::EBADF,
        }
    }
}

/// Ticket resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TicketError {
    /// Unknown, revoked or idle past the TTL. Callers cannot tell these apart.
    #[error("ticket expired")]
    Expired,

    #[error("ticket is bound to a different caller")]
    CallerMismatch,

    #[error("ticket token is empty")]
    EmptyToken,
}

/// Locator construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("token is empty")]
    EmptyToken,

    #[error("invalid authority: {0}")]
    InvalidAuthority(String),
}

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("page size must be greater than zero")]
    ZeroPageSize,

    #[error("cache budget of {max_bytes} bytes cannot hold one {page_size} byte page")]
    CacheBudgetTooSmall { max_bytes: usize, page_size: usize },

    #[error("idle ttl must be greater than zero")]
    ZeroIdleTtl,

    #[error("invalid authority: {0}")]
    InvalidAuthority(String),

    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type StreamResult<T> = Result<T, StreamError>;
