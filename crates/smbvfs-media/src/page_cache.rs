//! Fixed-page LRU cache in front of a [`RandomAccessSource`].
//!
//! The source is divided into pages of `page_size` bytes; page `i` covers
//! `[i * page_size, min((i + 1) * page_size, size))`. Pages are fetched on
//! demand and kept until the resident total would exceed the byte budget,
//! at which point the least recently used page goes first.
//!
//! Recency is a monotonically increasing sequence number, not wall-clock
//! time, so two accesses never tie. Pages are [`Bytes`] and are shared with
//! callers rather than copied: a page evicted while a caller still holds a
//! slice of it stays alive until that slice is dropped.
//!
//! All state sits behind one mutex. A request holds it for its whole
//! duration, so concurrent readers of the same stream are serialized and no
//! page is ever fetched twice for overlapping requests.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::StreamConfig;
use crate::error::{ConfigError, SmbMediaError, SmbMediaErrorCode, StreamError, StreamResult};
use crate::source::{RandomAccessSource, checked_end};

/// Default page size: 256 KiB.
pub const DEFAULT_PAGE_SIZE: usize = 256 * 1024;

/// Default resident budget: 64 MiB.
pub const DEFAULT_MAX_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Counters for a cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Pages served from memory.
    pub hits: u64,
    /// Pages read from the source.
    pub fetches: u64,
    pub evictions: u64,
    pub resident_pages: usize,
    pub resident_bytes: usize,
}

/// A resident page plus its recency.
struct CacheEntry {
    bytes: Bytes,
    last_used_seq: u64,
    inserted_seq: u64,
}

struct Inner<S> {
    source: S,
    pages: HashMap<u64, CacheEntry>,
    resident_bytes: usize,
    seq: u64,
    stats: CacheStats,
}

impl<S: RandomAccessSource> Inner<S> {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Return page `index`, fetching it on a miss.
    fn page(
        &mut self,
        index: u64,
        page_size: usize,
        max_bytes: usize,
        pinned: &RangeInclusive<u64>,
    ) -> StreamResult<Bytes> {
        let seq = self.next_seq();
        if let Some(entry) = self.pages.get_mut(&index) {
            entry.last_used_seq = seq;
            self.stats.hits += 1;
            trace!(page = index, "page hit");
            return Ok(entry.bytes.clone());
        }

        let start = index * page_size as u64;
        let bytes = self.source.read_at(start, page_size)?;
        self.stats.fetches += 1;
        trace!(page = index, len = bytes.len(), "page fetched");

        // Only the last page may be short; anything else would be served
        // truncated for as long as it stays resident.
        let full = self.source.size().saturating_sub(start).min(page_size as u64);
        if (bytes.len() as u64) < full {
            debug!(page = index, len = bytes.len(), full, "short page not cached");
            return Err(StreamError::Remote(SmbMediaError::new(
                SmbMediaErrorCode::BufferUnderrun,
            )));
        }

        self.resident_bytes += bytes.len();
        self.pages.insert(
            index,
            CacheEntry {
                bytes: bytes.clone(),
                last_used_seq: seq,
                inserted_seq: seq,
            },
        );
        self.evict(max_bytes, Some(pinned));
        Ok(bytes)
    }

    /// Drop least-recently-used pages until the budget holds.
    ///
    /// Pages in `pinned` are skipped; if only pinned pages remain the budget
    /// is left exceeded and the caller must call again without pins.
    fn evict(&mut self, max_bytes: usize, pinned: Option<&RangeInclusive<u64>>) {
        while self.resident_bytes > max_bytes {
            let victim = self
                .pages
                .iter()
                .filter(|(index, _)| pinned.is_none_or(|p| !p.contains(index)))
                .min_by_key(|(_, e)| (e.last_used_seq, e.inserted_seq))
                .map(|(index, _)| *index);

            let Some(index) = victim else { break };
            if let Some(entry) = self.pages.remove(&index) {
                self.resident_bytes -= entry.bytes.len();
                self.stats.evictions += 1;
                trace!(page = index, "page evicted");
            }
        }
    }
}

/// Paged LRU cache over a random-access source.
pub struct PageCache<S> {
    page_size: usize,
    max_bytes: usize,
    size: u64,
    inner: Mutex<Inner<S>>,
}

impl<S: RandomAccessSource> PageCache<S> {
    /// Create a cache with the given geometry.
    ///
    /// Rejects a zero page size and a budget smaller than one page.
    pub fn new(source: S, page_size: usize, max_bytes: usize) -> Result<Self, ConfigError> {
        if page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if max_bytes < page_size {
            return Err(ConfigError::CacheBudgetTooSmall {
                max_bytes,
                page_size,
            });
        }
        let size = source.size();
        debug!(size, page_size, max_bytes, "page cache created");
        Ok(Self {
            page_size,
            max_bytes,
            size,
            inner: Mutex::new(Inner {
                source,
                pages: HashMap::new(),
                resident_bytes: 0,
                seq: 0,
                stats: CacheStats::default(),
            }),
        })
    }

    /// Create a cache with the page size and budget from `config`.
    pub fn from_config(source: S, config: &StreamConfig) -> Result<Self, ConfigError> {
        Self::new(source, config.page_size_bytes, config.max_cache_bytes)
    }

    /// Size of the underlying source.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Resident byte budget.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Returns `min(len, size - offset)` bytes, or an empty buffer at or past
    /// EOF. A single-page request is a zero-copy slice of the cached page.
    pub fn read(&self, offset: u64, len: usize) -> StreamResult<Bytes> {
        let end = checked_end(offset, len)?;
        if len == 0 || offset >= self.size {
            return Ok(Bytes::new());
        }
        let end = end.min(self.size);
        let page = self.page_size as u64;
        let pinned = (offset / page)..=((end - 1) / page);

        let mut inner = self.inner.lock();
        let fetched: StreamResult<Vec<(u64, Bytes)>> = pinned
            .clone()
            .map(|index| {
                inner
                    .page(index, self.page_size, self.max_bytes, &pinned)
                    .map(|bytes| (index, bytes))
            })
            .collect();
        // A request spanning more pages than the budget holds them pinned
        // until here; callers keep their clones either way.
        inner.evict(self.max_bytes, None);
        drop(inner);

        let pages = fetched?;
        Ok(self.assemble(&pages, offset, end))
    }

    /// Stitch page slices covering `[offset, end)` into one buffer.
    ///
    /// Every page is full except possibly the one holding EOF.
    fn assemble(&self, pages: &[(u64, Bytes)], offset: u64, end: u64) -> Bytes {
        let page = self.page_size as u64;
        let segment = |index: u64, bytes: &Bytes| -> Bytes {
            let page_start = index * page;
            let from = offset.saturating_sub(page_start) as usize;
            let to = ((end - page_start) as usize).min(bytes.len());
            bytes.slice(from.min(to)..to)
        };

        if let [(index, bytes)] = pages {
            return segment(*index, bytes);
        }

        let mut out = BytesMut::with_capacity((end - offset) as usize);
        for (index, bytes) in pages {
            out.extend_from_slice(&segment(*index, bytes));
        }
        out.freeze()
    }

    /// Snapshot of the counters, with the current resident totals.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            resident_pages: inner.pages.len(),
            resident_bytes: inner.resident_bytes,
            ..inner.stats
        }
    }

    /// Bytes currently held across all resident pages.
    pub fn resident_bytes(&self) -> usize {
        self.inner.lock().resident_bytes
    }

    /// Drop every resident page.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.pages.clear();
        inner.resident_bytes = 0;
    }

    /// Drop every page and close the source. Later reads of uncached data fail
    /// with [`StreamError::Closed`].
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.pages.clear();
        inner.resident_bytes = 0;
        inner.source.close();
    }
}

impl<S> std::fmt::Debug for PageCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("size", &self.size)
            .field("page_size", &self.page_size)
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}
