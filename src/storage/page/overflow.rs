//! Overflow page chain for text values too large to inline (spec §3.2).
//!
//! Grounded on nimbus's `storage::page` overflow handling for oversized
//! tuple fields: a small fixed header (`page_kind | next_page | data_len`)
//! followed by as much raw payload as fits, chained via `next_page` until
//! the text is exhausted or `MAX_OVERFLOW_PAGES` is reached.

use crate::constants::{OVERFLOW_HEADER_SIZE, PAGE_SIZE};
use crate::storage::page::base::{PageIdx, PageKind};

pub const OVERFLOW_PAYLOAD_CAP: usize = PAGE_SIZE - OVERFLOW_HEADER_SIZE;

/// Overflow pages carry their own compact `page_kind | next_page | data_len`
/// header instead of the 32-byte common [`PageHeader`](super::header::PageHeader);
/// they have no slot directory to make room for, so that header would waste
/// space the payload needs.
pub struct OverflowPage<'a> {
    buf: &'a mut [u8; PAGE_SIZE],
}

impl<'a> OverflowPage<'a> {
    pub fn new(buf: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self { buf }
    }

    pub fn init(&mut self, next_page: PageIdx, payload: &[u8]) {
        debug_assert!(payload.len() <= OVERFLOW_PAYLOAD_CAP);
        self.buf[0] = PageKind::Overflow as u8;
        self.buf[1..5].copy_from_slice(&next_page.to_le_bytes());
        self.buf[5..9].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        self.buf[OVERFLOW_HEADER_SIZE..OVERFLOW_HEADER_SIZE + payload.len()]
            .copy_from_slice(payload);
    }

    pub fn next_page(&self) -> PageIdx {
        u32::from_le_bytes(self.buf[1..5].try_into().unwrap())
    }

    pub fn data_len(&self) -> usize {
        u32::from_le_bytes(self.buf[5..9].try_into().unwrap()) as usize
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[OVERFLOW_HEADER_SIZE..OVERFLOW_HEADER_SIZE + self.data_len()]
    }
}
