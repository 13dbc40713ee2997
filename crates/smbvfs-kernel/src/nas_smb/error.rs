//! Remote mount errors.

use std::io;

use smbvfs_media::{SmbMediaError, SmbMediaErrorCode};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Failure classes for remote mounts and their configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum NasSmbErrorCode {
    Timeout,
    AuthFailed,
    ShareNotFound,
    PermissionDenied,
    HostUnreachable,
    InvalidConfig,
    MissingCredentials,
    NotFound,
    Io,
}

impl NasSmbErrorCode {
    /// The sanitized media code a stream reader sees for this failure.
    pub fn media_code(self) -> SmbMediaErrorCode {
        match self {
            Self::Timeout => SmbMediaErrorCode::Timeout,
            Self::AuthFailed => SmbMediaErrorCode::AuthFailed,
            Self::ShareNotFound => SmbMediaErrorCode::ShareNotFound,
            Self::PermissionDenied => SmbMediaErrorCode::PermissionDenied,
            Self::HostUnreachable => SmbMediaErrorCode::HostUnreachable,
            Self::NotFound => SmbMediaErrorCode::FileNotFound,
            Self::InvalidConfig | Self::MissingCredentials | Self::Io => SmbMediaErrorCode::Unknown,
        }
    }
}

/// A remote mount failure with operator-facing detail.
///
/// The message may name mounts and paths. It is never handed to stream
/// readers; they get [`SmbMediaError`] via [`From`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("nas_smb[{code}] {message}")]
pub struct NasSmbError {
    pub code: NasSmbErrorCode,
    pub message: String,
}

impl NasSmbError {
    pub fn new(code: NasSmbErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = match message.trim() {
            "" => "error".to_string(),
            trimmed => trimmed.to_string(),
        };
        Self { code, message }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(NasSmbErrorCode::Timeout, message)
    }

    pub fn host_unreachable(message: impl Into<String>) -> Self {
        Self::new(NasSmbErrorCode::HostUnreachable, message)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(NasSmbErrorCode::InvalidConfig, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(NasSmbErrorCode::PermissionDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(NasSmbErrorCode::NotFound, message)
    }

    /// Closest `io::ErrorKind` for callers that speak `std::io`.
    pub fn io_kind(&self) -> io::ErrorKind {
        match self.code {
            NasSmbErrorCode::Timeout => io::ErrorKind::TimedOut,
            NasSmbErrorCode::AuthFailed | NasSmbErrorCode::PermissionDenied => {
                io::ErrorKind::PermissionDenied
            }
            NasSmbErrorCode::ShareNotFound | NasSmbErrorCode::NotFound => io::ErrorKind::NotFound,
            NasSmbErrorCode::HostUnreachable => io::ErrorKind::HostUnreachable,
            NasSmbErrorCode::InvalidConfig | NasSmbErrorCode::MissingCredentials => {
                io::ErrorKind::InvalidInput
            }
            NasSmbErrorCode::Io => io::ErrorKind::Other,
        }
    }
}

impl From<&NasSmbError> for SmbMediaError {
    fn from(e: &NasSmbError) -> Self {
        SmbMediaError::new(e.code.media_code())
    }
}

/// Remote mount result type.
pub type NasSmbResult<T> = Result<T, NasSmbError>;
