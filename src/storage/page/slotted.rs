//! Generic variable-length-cell slot directory.
//!
//! Grounded on nimbus `storage::page::slotted_data`: a slot directory that
//! grows downward from just after the page header while cell payloads grow
//! upward from the end of the page, slots sorted by insertion order and the
//! caller responsible for keeping them sorted by key. nimbus hard-codes one
//! cell shape per page kind (`SlottedData`, `BPlusLeaf`, `BPlusInner` each
//! reimplement this loop); here the directory walk is factored out once and
//! table/index leaf/internal pages supply only their own cell encoding.

use std::cmp::Ordering;

use crate::constants::PAGE_SIZE;
use crate::storage::page::header::{PageHeader, PAGE_HEADER_SIZE};

const SLOT_SIZE: usize = 4;

/// A mutable view over one page's slot directory and cell area. Does not
/// itself know what a cell's bytes mean; table/index page wrappers build
/// their typed cells on top of `cell_at`/`insert_at`/`remove_at`.
pub struct SlottedPage<'a> {
    buf: &'a mut [u8; PAGE_SIZE],
}

impl<'a> SlottedPage<'a> {
    pub fn new(buf: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self { buf }
    }

    fn header(&mut self) -> PageHeader<'_> {
        PageHeader::new(&mut self.buf[..])
    }

    pub fn num_cells(&mut self) -> usize {
        self.header().num_cells() as usize
    }

    fn slot_offset(idx: usize) -> usize {
        PAGE_HEADER_SIZE + idx * SLOT_SIZE
    }

    fn read_slot(&self, idx: usize) -> (u16, u16) {
        let off = Self::slot_offset(idx);
        let cell_off = u16::from_le_bytes(self.buf[off..off + 2].try_into().unwrap());
        let cell_len = u16::from_le_bytes(self.buf[off + 2..off + 4].try_into().unwrap());
        (cell_off, cell_len)
    }

    fn write_slot(&mut self, idx: usize, cell_off: u16, cell_len: u16) {
        let off = Self::slot_offset(idx);
        self.buf[off..off + 2].copy_from_slice(&cell_off.to_le_bytes());
        self.buf[off + 2..off + 4].copy_from_slice(&cell_len.to_le_bytes());
    }

    pub fn cell_at(&self, idx: usize) -> &[u8] {
        let (cell_off, cell_len) = self.read_slot(idx);
        &self.buf[cell_off as usize..cell_off as usize + cell_len as usize]
    }

    /// Binary-searches the slot directory with a comparator applied to each
    /// cell's raw bytes. `Ok(idx)` on an exact match, `Err(idx)` with the slot
    /// the key would need to be inserted at to keep cells ordered.
    pub fn binary_search(&mut self, mut cmp: impl FnMut(&[u8]) -> Ordering) -> Result<usize, usize> {
        let mut lo = 0usize;
        let mut hi = self.num_cells();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match cmp(self.cell_at(mid)) {
                Ordering::Equal => return Ok(mid),
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        Err(lo)
    }

    pub fn header_right_child(&mut self) -> u32 {
        self.header().right_child()
    }

    pub fn set_header_right_child(&mut self, child: u32) {
        self.header().set_right_child(child);
    }

    pub fn header_level(&mut self) -> u16 {
        self.header().level()
    }

    pub fn header_next_page(&mut self) -> u32 {
        self.header().next_page()
    }

    pub fn set_header_next_page(&mut self, next: u32) {
        self.header().set_next_page(next);
    }

    /// Bytes of free space between the slot directory and the cell area.
    pub fn free_space(&mut self) -> usize {
        self.header().free_space() as usize
    }

    /// Whether a cell of `payload_len` bytes fits without a split, counting
    /// the new slot entry it also needs.
    pub fn fits(&mut self, payload_len: usize) -> bool {
        self.free_space() >= payload_len + SLOT_SIZE
    }

    /// Inserts a new cell's payload at slot `idx`, shifting later slots down
    /// by one. Caller picks `idx` to keep cells sorted by key.
    pub fn insert_at(&mut self, idx: usize, payload: &[u8]) {
        let mut header = self.header();
        let num_cells = header.num_cells() as usize;
        let free_start = header.free_start();
        let free_end = header.free_end();
        let new_free_end = free_end - payload.len() as u16;
        drop(header);

        debug_assert!(idx <= num_cells);
        self.buf[new_free_end as usize..free_end as usize].copy_from_slice(payload);

        // shift slot entries [idx, num_cells) down by one slot
        for i in (idx..num_cells).rev() {
            let (off, len) = self.read_slot(i);
            self.write_slot(i + 1, off, len);
        }
        self.write_slot(idx, new_free_end, payload.len() as u16);

        let mut header = self.header();
        header.set_num_cells(num_cells as u16 + 1);
        header.set_free_start(free_start + SLOT_SIZE as u16);
        header.set_free_end(new_free_end);
    }

    pub fn remove_at(&mut self, idx: usize) {
        let mut header = self.header();
        let num_cells = header.num_cells() as usize;
        let free_start = header.free_start();
        drop(header);
        debug_assert!(idx < num_cells);

        for i in idx..num_cells - 1 {
            let (off, len) = self.read_slot(i + 1);
            self.write_slot(i, off, len);
        }
        let mut header = self.header();
        header.set_num_cells(num_cells as u16 - 1);
        header.set_free_start(free_start - SLOT_SIZE as u16);
        // Cell-area bytes for the removed cell become unreachable garbage
        // until the page is next compacted by a full rebuild on split/merge;
        // nimbus's slotted pages accept the same fragmentation.
    }

    /// Rebuilds the page from a full ordered list of cell payloads, as used
    /// after a split or merge where the simplest correct approach is to
    /// re-lay the whole page out rather than patch slots incrementally.
    pub fn rebuild(&mut self, kind_tag_preserved: bool, cells: &[&[u8]]) {
        let (kind, level, next_page, right_child, is_root) = {
            let h = self.header();
            (
                h.kind(),
                h.level(),
                h.next_page(),
                h.right_child(),
                h.is_root(),
            )
        };
        let kind = kind.expect("page must have a valid kind before rebuild");
        self.buf.fill(0);
        let mut header = self.header();
        header.init(kind);
        if kind_tag_preserved {
            header.set_level(level);
            header.set_next_page(next_page);
            header.set_right_child(right_child);
            header.set_root(is_root);
        }
        drop(header);
        for (i, cell) in cells.iter().enumerate() {
            self.insert_at(i, cell);
        }
    }
}
