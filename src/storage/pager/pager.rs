//! Shared page cache sitting on top of [`FileManager`].
//!
//! Grounded on nimbus's `storage::buffer::buffer_pool::BufferPoolCore`:
//! fetch pins a page into the cache (loading it from disk on a miss),
//! callers mutate through the pinned handle and mark it dirty, `unpin`
//! releases it, and a full cache evicts via the configured [`Evictor`],
//! flushing dirty victims first. nimbus backs this with one large
//! `Pin`-boxed byte array sliced into fixed frames so `Frame::page_view`
//! can hand out `&mut` references without an extra allocation; this keeps
//! the same fetch/pin/unpin/evict protocol but gives every cached page its
//! own heap box instead, trading a pointer indirection for not needing
//! `unsafe` to manage frame lifetimes.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::constants::PAGE_SIZE;
use crate::error::{DbError, DbResult};
use crate::storage::disk::FileManager;
use crate::storage::page::base::{new_page_buf, PageBuf, PageIdx, PageKind};
use crate::storage::page::header::PageHeader;
use crate::storage::pager::evict::{Evictor, FifoEvictor};

const DEFAULT_CAPACITY: usize = 256;

struct CachedPage {
    buf: Box<PageBuf>,
    pin_count: u32,
    dirty: bool,
}

/// A page's pre-mutation content plus the version it carried, captured the
/// first time a transaction touches it (spec §4.3 optimistic concurrency).
struct Touch {
    preimage: Box<PageBuf>,
    observed_version: u64,
}

pub struct Pager {
    file: FileManager,
    cache: HashMap<PageIdx, CachedPage>,
    evictor: Box<dyn Evictor + Send>,
    capacity: usize,
    versions: HashMap<PageIdx, u64>,
    capture: Option<HashMap<PageIdx, Touch>>,
}

impl Pager {
    pub fn open(path: &str) -> DbResult<Self> {
        Ok(Self {
            file: FileManager::open(path)?,
            cache: HashMap::new(),
            evictor: Box::new(FifoEvictor::new()),
            capacity: DEFAULT_CAPACITY,
            versions: HashMap::new(),
            capture: None,
        })
    }

    #[cfg(test)]
    pub fn open_for_test(path: &str) -> DbResult<Self> {
        Ok(Self {
            file: FileManager::open_buffered(path)?,
            cache: HashMap::new(),
            evictor: Box::new(FifoEvictor::new()),
            capacity: DEFAULT_CAPACITY,
            versions: HashMap::new(),
            capture: None,
        })
    }

    pub fn version_of(&self, idx: PageIdx) -> u64 {
        *self.versions.get(&idx).unwrap_or(&0)
    }

    /// Starts recording a pre-image and observed version for every page this
    /// transaction touches, the first time it touches it. Must be paired with
    /// either [`Pager::commit_capture`] or [`Pager::abort_capture`].
    pub fn begin_capture(&mut self) {
        self.capture = Some(HashMap::new());
    }

    /// Bumps the version of every touched page by one and returns their
    /// pre-images, for the caller to journal before flushing. Call only after
    /// read-set validation against [`Pager::version_of`] has succeeded.
    pub fn commit_capture(&mut self) -> Vec<(PageIdx, Box<PageBuf>)> {
        let touched = self.capture.take().unwrap_or_default();
        let mut preimages = Vec::with_capacity(touched.len());
        for (idx, touch) in touched {
            *self.versions.entry(idx).or_insert(0) += 1;
            preimages.push((idx, touch.preimage));
        }
        preimages
    }

    /// The first touched page whose current version no longer matches the
    /// version observed when the active transaction first touched it, if
    /// any. `None` means every touched page is still at the version this
    /// transaction saw, so the transaction may commit.
    pub fn conflicting_page(&self) -> Option<PageIdx> {
        let capture = self.capture.as_ref()?;
        capture
            .iter()
            .find(|(idx, touch)| self.version_of(**idx) != touch.observed_version)
            .map(|(idx, _)| *idx)
    }

    /// Discards the in-progress capture, restoring every touched page's
    /// cached content back to its pre-transaction state. Used when read-set
    /// validation fails, undoing speculative writes that never reached disk.
    pub fn abort_capture(&mut self) {
        let touched = self.capture.take().unwrap_or_default();
        for (idx, touch) in touched {
            if let Some(entry) = self.cache.get_mut(&idx) {
                entry.buf = touch.preimage;
                entry.dirty = false;
            }
        }
    }

    pub fn num_pages(&mut self) -> DbResult<u32> {
        Ok(self.file.num_pages()?)
    }

    /// Pins `idx` into the cache, loading it from disk on a miss, and
    /// returns a mutable view over its buffer. Every `fetch` must be paired
    /// with an `unpin`.
    pub fn fetch(&mut self, idx: PageIdx) -> DbResult<&mut PageBuf> {
        if !self.cache.contains_key(&idx) {
            self.load(idx)?;
        }
        if let Some(capture) = &mut self.capture {
            if !capture.contains_key(&idx) {
                let preimage = Box::new(*self.cache.get(&idx).unwrap().buf.as_ref());
                let observed_version = *self.versions.get(&idx).unwrap_or(&0);
                capture.insert(idx, Touch { preimage, observed_version });
            }
        }
        let entry = self.cache.get_mut(&idx).expect("just loaded");
        entry.pin_count += 1;
        self.evictor.notify_pin(idx);
        trace!(page = idx, pins = entry.pin_count, "fetch");
        Ok(&mut self.cache.get_mut(&idx).unwrap().buf)
    }

    pub fn unpin(&mut self, idx: PageIdx, dirty: bool) {
        if let Some(entry) = self.cache.get_mut(&idx) {
            entry.pin_count = entry.pin_count.saturating_sub(1);
            entry.dirty |= dirty;
            self.evictor.notify_unpin(idx);
        }
    }

    /// Allocates a new page (reusing a freed page if the free list has one),
    /// pins it, and returns its index plus a zeroed buffer tagged with
    /// `kind`.
    pub fn new_page(&mut self, kind: PageKind) -> DbResult<(PageIdx, &mut PageBuf)> {
        let idx = self.file.allocate_page()?;
        let mut buf = new_page_buf();
        PageHeader::new(&mut buf[..]).init(kind);
        self.evict_if_full()?;
        self.cache.insert(
            idx,
            CachedPage {
                buf,
                pin_count: 1,
                dirty: true,
            },
        );
        self.evictor.notify_load(idx);
        debug!(page = idx, kind = kind.name(), "new_page");
        Ok((idx, &mut self.cache.get_mut(&idx).unwrap().buf))
    }

    pub fn flush(&mut self, idx: PageIdx) -> DbResult<()> {
        if let Some(entry) = self.cache.get_mut(&idx) {
            if entry.dirty {
                self.file.write_page(idx, &entry.buf)?;
                entry.dirty = false;
            }
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> DbResult<()> {
        let dirty: Vec<PageIdx> = self
            .cache
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(&idx, _)| idx)
            .collect();
        for idx in dirty {
            self.flush(idx)?;
        }
        self.file.sync()?;
        Ok(())
    }

    fn load(&mut self, idx: PageIdx) -> DbResult<()> {
        self.evict_if_full()?;
        let mut buf = new_page_buf();
        self.file.read_page(idx, &mut buf)?;
        self.cache.insert(
            idx,
            CachedPage {
                buf,
                pin_count: 0,
                dirty: false,
            },
        );
        self.evictor.notify_load(idx);
        Ok(())
    }

    fn evict_if_full(&mut self) -> DbResult<()> {
        if self.cache.len() < self.capacity {
            return Ok(());
        }
        let cache = &self.cache;
        let victim = self
            .evictor
            .pick_victim(&|idx| cache.get(&idx).map(|e| e.pin_count > 0).unwrap_or(true));
        let Some(victim) = victim else {
            return Err(DbError::CorruptPage {
                page: 0,
                reason: "page cache full and every cached page is pinned".into(),
            });
        };
        self.flush(victim)?;
        self.cache.remove(&victim);
        self.evictor.notify_evict(victim);
        trace!(page = victim, "evicted");
        Ok(())
    }
}

pub const PAGE_BUF_SIZE: usize = PAGE_SIZE;
