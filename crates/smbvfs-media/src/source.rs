//! Random-access byte sources.
//!
//! [`RandomAccessSource`] is the seam the page cache reads through.
//! [`BackendSource`] adapts a remote file handle to it: the size is taken
//! once at open, reads are clipped at EOF, and every backend failure is
//! sanitized through [`crate::mapper`] before it leaves this module.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{BackendError, SmbMediaError, SmbMediaErrorCode, StreamError, StreamResult};
use crate::mapper;

/// A fixed-size byte source that can be read at arbitrary offsets.
pub trait RandomAccessSource: Send {
    /// Total size in bytes. Stable for the lifetime of the source.
    fn size(&self) -> u64;

    /// Read up to `len` bytes at `offset`.
    ///
    /// Returns fewer bytes when the range crosses EOF and an empty buffer when
    /// `offset >= size` or `len == 0`.
    fn read_at(&mut self, offset: u64, len: usize) -> StreamResult<Bytes>;

    /// Release the underlying handle. Idempotent.
    fn close(&mut self);
}

impl<S: RandomAccessSource + ?Sized> RandomAccessSource for Box<S> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_at(&mut self, offset: u64, len: usize) -> StreamResult<Bytes> {
        (**self).read_at(offset, len)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// An open remote file as a protocol client exposes it.
pub trait RemoteFile: Send {
    fn size(&mut self) -> Result<u64, BackendError>;

    /// Read up to `len` bytes at `offset`. May return fewer.
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Bytes, BackendError>;

    fn close(&mut self) -> Result<(), BackendError>;
}

/// Opens remote files by mount name and share-relative path.
pub trait RemoteFileOpener: Send + Sync {
    fn open(&self, mount_name: &str, rel_path: &str) -> Result<Box<dyn RemoteFile>, BackendError>;
}

/// Check that `offset + len` is representable.
pub(crate) fn checked_end(offset: u64, len: usize) -> StreamResult<u64> {
    u64::try_from(len)
        .ok()
        .and_then(|len| offset.checked_add(len))
        .ok_or(StreamError::InvalidRange { offset, len })
}

/// [`RandomAccessSource`] over a [`RemoteFile`].
pub struct BackendSource {
    file: Box<dyn RemoteFile>,
    size: u64,
    closed: bool,
}

impl BackendSource {
    /// Wrap an open remote file, querying its size once.
    pub fn new(mut file: Box<dyn RemoteFile>) -> Result<Self, SmbMediaError> {
        let size = match file.size() {
            Ok(size) => size,
            Err(e) => {
                let mapped = mapper::to_error(&e);
                let _ = file.close();
                return Err(mapped);
            }
        };
        Ok(Self {
            file,
            size,
            closed: false,
        })
    }

    /// Open `rel_path` on `mount_name` through `opener`.
    pub fn open(
        opener: &dyn RemoteFileOpener,
        mount_name: &str,
        rel_path: &str,
    ) -> Result<Self, SmbMediaError> {
        let file = opener
            .open(mount_name, rel_path)
            .map_err(|e| mapper::to_error(&e))?;
        Self::new(file)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// One backend read of at most `want` bytes. An empty answer short of
    /// EOF is a buffer underrun.
    fn read_chunk(&mut self, offset: u64, want: usize) -> StreamResult<Bytes> {
        let mut bytes = self
            .file
            .read_at(offset, want)
            .map_err(|e| StreamError::Remote(mapper::to_error(&e)))?;
        if bytes.is_empty() {
            debug!(offset, want, size = self.size, "remote read returned no data");
            return Err(StreamError::Remote(SmbMediaError::new(
                SmbMediaErrorCode::BufferUnderrun,
            )));
        }
        bytes.truncate(want);
        Ok(bytes)
    }
}

impl RandomAccessSource for BackendSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, len: usize) -> StreamResult<Bytes> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        checked_end(offset, len)?;
        if len == 0 || offset >= self.size {
            return Ok(Bytes::new());
        }

        // Clip to EOF; the remainder always fits in usize because len does.
        let want = (self.size - offset).min(len as u64) as usize;
        let mut bytes = self.read_chunk(offset, want)?;
        if bytes.len() == want {
            return Ok(bytes);
        }

        // Short read before EOF: keep asking until the range is filled.
        let mut buf = BytesMut::with_capacity(want);
        buf.extend_from_slice(&bytes);
        while buf.len() < want {
            bytes = self.read_chunk(offset + buf.len() as u64, want - buf.len())?;
            buf.extend_from_slice(&bytes);
        }
        Ok(buf.freeze())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.file.close() {
            debug!(code = %mapper::to_error(&e).code(), "remote close failed");
        }
    }
}

impl Drop for BackendSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeFile {
        data: Vec<u8>,
        closes: Arc<AtomicUsize>,
        fail_reads: bool,
        /// Most bytes a single read hands back.
        max_chunk: Option<usize>,
        /// Reads at or past this offset return nothing.
        stall_at: Option<u64>,
    }

    impl RemoteFile for FakeFile {
        fn size(&mut self) -> Result<u64, BackendError> {
            Ok(self.data.len() as u64)
        }

        fn read_at(&mut self, offset: u64, len: usize) -> Result<Bytes, BackendError> {
            if self.fail_reads {
                return Err(BackendError::other("STATUS_ACCESS_DENIED \\\\nas\\share"));
            }
            if self.stall_at.is_some_and(|at| offset >= at) {
                return Ok(Bytes::new());
            }
            let start = offset as usize;
            let end = match self.max_chunk {
                Some(chunk) => (start + len.min(chunk)).min(self.data.len()),
                // Over-return to exercise clipping.
                None => (start + len + 8).min(self.data.len()),
            };
            Ok(Bytes::copy_from_slice(&self.data[start..end]))
        }

        fn close(&mut self) -> Result<(), BackendError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fake(len: usize) -> (FakeFile, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let file = FakeFile {
            data: (0..len).map(|i| i as u8).collect(),
            closes: closes.clone(),
            fail_reads: false,
            max_chunk: None,
            stall_at: None,
        };
        (file, closes)
    }

    fn source(len: usize, fail_reads: bool) -> (BackendSource, Arc<AtomicUsize>) {
        let (mut file, closes) = fake(len);
        file.fail_reads = fail_reads;
        (BackendSource::new(Box::new(file)).unwrap(), closes)
    }

    #[test]
    fn reads_clip_at_eof_and_request() {
        let (mut src, _) = source(100, false);
        assert_eq!(src.size(), 100);
        assert_eq!(src.read_at(10, 5).unwrap().as_ref(), &[10, 11, 12, 13, 14]);
        assert_eq!(src.read_at(95, 50).unwrap().len(), 5);
        assert!(src.read_at(100, 10).unwrap().is_empty());
        assert!(src.read_at(5, 0).unwrap().is_empty());
    }

    #[test]
    fn short_reads_are_filled_from_further_requests() {
        let (mut file, _) = fake(250);
        file.max_chunk = Some(16);
        let mut src = BackendSource::new(Box::new(file)).unwrap();

        let got = src.read_at(0, 64).unwrap();
        assert_eq!(got.len(), 64);
        assert_eq!(got.as_ref(), (0..64u8).collect::<Vec<_>>().as_slice());

        let tail = src.read_at(200, 100).unwrap();
        assert_eq!(tail.as_ref(), (200..250u8).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn empty_read_before_eof_is_underrun() {
        let (mut file, _) = fake(250);
        file.max_chunk = Some(16);
        file.stall_at = Some(40);
        let mut src = BackendSource::new(Box::new(file)).unwrap();

        assert_eq!(src.read_at(0, 32).unwrap().len(), 32);
        let err = src.read_at(0, 64).unwrap_err();
        assert_eq!(
            err,
            StreamError::Remote(SmbMediaError::new(SmbMediaErrorCode::BufferUnderrun))
        );
    }

    #[test]
    fn overflowing_range_is_rejected() {
        let (mut src, _) = source(10, false);
        assert_eq!(
            src.read_at(u64::MAX, 2),
            Err(StreamError::InvalidRange { offset: u64::MAX, len: 2 })
        );
    }

    #[test]
    fn backend_failures_are_sanitized() {
        let (mut src, _) = source(10, true);
        let err = src.read_at(0, 4).unwrap_err();
        assert_eq!(
            err,
            StreamError::Remote(SmbMediaError::new(SmbMediaErrorCode::PermissionDenied))
        );
        assert!(!err.to_string().contains("nas"));
    }

    #[test]
    fn close_is_idempotent_and_blocks_reads() {
        let (mut src, closes) = source(10, false);
        src.close();
        src.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(src.read_at(0, 1), Err(StreamError::Closed));
        drop(src);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_closes() {
        let (src, closes) = source(10, false);
        drop(src);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
