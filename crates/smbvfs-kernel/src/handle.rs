//! Open-file handles.
//!
//! Remote files are handled whole: the first access loads the file into
//! memory, edits happen in the buffer, and the buffer is written back on
//! `flush` or `close`. Local files use positional reads and writes through
//! [`VfsOps`], so nothing is buffered.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::nas_smb::NasSmbVfs;
use crate::vfs::{VfsError, VfsOps};

/// A seekable, sized, explicitly closed file.
pub trait FileHandle: Read + Write + Seek + Send {
    fn size(&mut self) -> io::Result<u64>;

    fn set_len(&mut self, size: u64) -> io::Result<()>;

    /// Flush pending writes and release the handle. Idempotent.
    fn close(&mut self) -> io::Result<()>;
}

fn closed_error() -> io::Error {
    io::Error::other("handle is closed")
}

fn read_only_error() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "handle is read-only")
}

fn seek_target(base: u64, delta: i64) -> io::Result<u64> {
    base.checked_add_signed(delta)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek out of range"))
}

/// A remote file held whole in memory.
pub struct WholeFileHandle {
    vfs: Arc<NasSmbVfs>,
    mount: String,
    rel: String,
    max_bytes: u64,
    writable: bool,
    buf: Option<Vec<u8>>,
    pos: u64,
    dirty: bool,
    closed: bool,
}

impl WholeFileHandle {
    fn new(vfs: Arc<NasSmbVfs>, mount: &str, rel: &str, max_bytes: u64, writable: bool) -> Self {
        Self {
            vfs,
            mount: mount.to_string(),
            rel: rel.to_string(),
            max_bytes,
            writable,
            buf: None,
            pos: 0,
            dirty: false,
            closed: false,
        }
    }

    /// Read-only; loads on first access.
    pub fn reader(vfs: Arc<NasSmbVfs>, mount: &str, rel: &str, max_bytes: u64) -> Self {
        Self::new(vfs, mount, rel, max_bytes, false)
    }

    /// Read-write; loads on first access. A missing file reads as empty.
    pub fn writer(vfs: Arc<NasSmbVfs>, mount: &str, rel: &str, max_bytes: u64) -> Self {
        Self::new(vfs, mount, rel, max_bytes, true)
    }

    /// Starts empty and is written back on close even if nothing is written.
    pub fn truncated(vfs: Arc<NasSmbVfs>, mount: &str, rel: &str, max_bytes: u64) -> Self {
        let mut handle = Self::new(vfs, mount, rel, max_bytes, true);
        handle.buf = Some(Vec::new());
        handle.dirty = true;
        handle
    }

    /// Loads now and positions at the end; written back on close.
    pub fn appending(
        vfs: Arc<NasSmbVfs>,
        mount: &str,
        rel: &str,
        max_bytes: u64,
    ) -> io::Result<Self> {
        let mut handle = Self::new(vfs, mount, rel, max_bytes, true);
        handle.pos = handle.loaded()?.len() as u64;
        handle.dirty = true;
        Ok(handle)
    }

    /// Mark the handle so `close` writes the buffer even if unchanged.
    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn load(&self) -> io::Result<Vec<u8>> {
        let meta = self
            .vfs
            .metadata_or_null(&self.mount, &self.rel)
            .map_err(VfsError::from)?;
        match meta {
            None if self.writable => Ok(Vec::new()),
            None => Err(VfsError::not_found(&self.rel).into()),
            Some(meta) if meta.is_dir() => Err(VfsError::is_a_directory(&self.rel).into()),
            Some(meta) => {
                if let Some(size) = meta.size.filter(|size| *size > self.max_bytes) {
                    return Err(VfsError::FileTooLarge {
                        size,
                        limit: self.max_bytes,
                    }
                    .into());
                }
                Ok(self
                    .vfs
                    .read_bytes(&self.mount, &self.rel, self.max_bytes)
                    .map_err(VfsError::from)?)
            }
        }
    }

    fn loaded(&mut self) -> io::Result<&mut Vec<u8>> {
        if self.buf.is_none() {
            let data = self.load()?;
            self.buf = Some(data);
        }
        Ok(self.buf.get_or_insert_with(Vec::new))
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed { Err(closed_error()) } else { Ok(()) }
    }

    fn check_writable(&self) -> io::Result<()> {
        self.check_open()?;
        if self.writable { Ok(()) } else { Err(read_only_error()) }
    }

    fn check_limit(&self, len: u64) -> io::Result<()> {
        if len > self.max_bytes {
            return Err(VfsError::FileTooLarge {
                size: len,
                limit: self.max_bytes,
            }
            .into());
        }
        Ok(())
    }
}

impl Read for WholeFileHandle {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        let pos = self.pos;
        let data = self.loaded()?;
        let start = usize::try_from(pos).unwrap_or(usize::MAX).min(data.len());
        let n = out.len().min(data.len() - start);
        out[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for WholeFileHandle {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.check_writable()?;
        let end = self.pos.saturating_add(data.len() as u64);
        self.check_limit(end)?;
        let (start, end) = (self.pos as usize, end as usize);

        let buf = self.loaded()?;
        if end > buf.len() {
            buf.resize(end, 0);
        }
        buf[start..end].copy_from_slice(data);
        self.pos = end as u64;
        self.dirty = true;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed || !self.dirty {
            return Ok(());
        }
        let data = self.buf.as_deref().unwrap_or_default();
        self.vfs
            .write_bytes(&self.mount, &self.rel, data)
            .map_err(VfsError::from)?;
        self.dirty = false;
        Ok(())
    }
}

impl Seek for WholeFileHandle {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        self.check_open()?;
        self.pos = match target {
            SeekFrom::Start(n) => n,
            SeekFrom::Current(delta) => seek_target(self.pos, delta)?,
            SeekFrom::End(delta) => {
                let len = self.loaded()?.len() as u64;
                seek_target(len, delta)?
            }
        };
        Ok(self.pos)
    }
}

impl FileHandle for WholeFileHandle {
    fn size(&mut self) -> io::Result<u64> {
        self.check_open()?;
        Ok(self.loaded()?.len() as u64)
    }

    fn set_len(&mut self, size: u64) -> io::Result<()> {
        self.check_writable()?;
        self.check_limit(size)?;
        self.loaded()?.resize(size as usize, 0);
        self.dirty = true;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        let flushed = self.flush();
        self.closed = true;
        self.buf = None;
        flushed
    }
}

impl Drop for WholeFileHandle {
    fn drop(&mut self) {
        if !self.closed && self.dirty {
            if let Err(e) = self.flush() {
                warn!(mount = %self.mount, error = %e, "unflushed remote write lost on drop");
            }
        }
    }
}

/// A positional handle over any [`VfsOps`] path.
pub struct VfsFileHandle {
    fs: Arc<dyn VfsOps>,
    path: PathBuf,
    pos: u64,
    writable: bool,
    closed: bool,
}

impl VfsFileHandle {
    pub fn new(fs: Arc<dyn VfsOps>, path: impl Into<PathBuf>, writable: bool) -> Self {
        Self {
            fs,
            path: path.into(),
            pos: 0,
            writable,
            closed: false,
        }
    }

    /// Position at the current end of the file.
    pub fn at_end(mut self) -> io::Result<Self> {
        self.pos = self.fs.getattr(&self.path).map_err(io::Error::from)?.size;
        Ok(self)
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed { Err(closed_error()) } else { Ok(()) }
    }
}

impl Read for VfsFileHandle {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        let data = self.fs.read(&self.path, self.pos, out.len())?;
        out[..data.len()].copy_from_slice(&data);
        self.pos += data.len() as u64;
        Ok(data.len())
    }
}

impl Write for VfsFileHandle {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        if !self.writable {
            return Err(read_only_error());
        }
        let n = self.fs.write(&self.path, self.pos, data)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for VfsFileHandle {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        self.check_open()?;
        self.pos = match target {
            SeekFrom::Start(n) => n,
            SeekFrom::Current(delta) => seek_target(self.pos, delta)?,
            SeekFrom::End(delta) => seek_target(self.size()?, delta)?,
        };
        Ok(self.pos)
    }
}

impl FileHandle for VfsFileHandle {
    fn size(&mut self) -> io::Result<u64> {
        self.check_open()?;
        Ok(self.fs.getattr(&self.path)?.size)
    }

    fn set_len(&mut self, size: u64) -> io::Result<()> {
        self.check_open()?;
        if !self.writable {
            return Err(read_only_error());
        }
        Ok(self.fs.truncate(&self.path, size)?)
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}
