//! Chains arbitrary byte payloads across [`OverflowPage`]s (spec §3.2).
//!
//! Generalizes `index_tree`'s packed-row-ID overflow chain to raw bytes, used
//! by [`crate::value::Row::encode`]/`decode` for `Text` columns and
//! oversized `Varchar`s. Pages are taken from and returned to the
//! [`freelist`] so a value that shrinks or a dropped row gives its overflow
//! pages back to the file.

use crate::constants::MAX_TEXT_LEN;
use crate::error::{DbError, DbResult};
use crate::storage::freelist;
use crate::storage::page::base::PageKind;
use crate::storage::page::overflow::{OverflowPage, OVERFLOW_PAYLOAD_CAP};
use crate::storage::page::base::PageIdx;
use crate::storage::pager::Pager;

/// Writes `data` across as many overflow pages as it takes and returns the
/// index of the first one. Pages are allocated tail-first so each page's
/// `next_page` is known before it is written.
pub fn write_chain(pager: &mut Pager, data: &[u8]) -> DbResult<PageIdx> {
    if data.len() > MAX_TEXT_LEN {
        return Err(DbError::Validate(format!(
            "value of {} bytes exceeds maximum text length {}",
            data.len(),
            MAX_TEXT_LEN
        )));
    }
    let mut chunks: Vec<&[u8]> = data.chunks(OVERFLOW_PAYLOAD_CAP).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }
    let mut next: PageIdx = 0;
    for chunk in chunks.into_iter().rev() {
        let idx = freelist::alloc_page(pager, PageKind::Overflow)?;
        let buf = pager.fetch(idx)?;
        OverflowPage::new(buf).init(next, chunk);
        pager.unpin(idx, true);
        next = idx;
    }
    Ok(next)
}

/// Reads `total_len` bytes back out of the chain rooted at `first`.
pub fn read_chain(pager: &mut Pager, first: PageIdx, total_len: usize) -> DbResult<Vec<u8>> {
    let mut out = Vec::with_capacity(total_len);
    let mut current = first;
    while current != 0 && out.len() < total_len {
        let buf = pager.fetch(current)?;
        let (next, payload) = {
            let p = OverflowPage::new(buf);
            (p.next_page(), p.payload().to_vec())
        };
        pager.unpin(current, false);
        out.extend_from_slice(&payload);
        current = next;
    }
    out.truncate(total_len);
    Ok(out)
}

/// Returns every page in the chain rooted at `first` to the free list.
pub fn free_chain(pager: &mut Pager, first: PageIdx) -> DbResult<()> {
    let mut current = first;
    while current != 0 {
        let buf = pager.fetch(current)?;
        let next = OverflowPage::new(buf).next_page();
        pager.unpin(current, false);
        freelist::free_page(pager, current)?;
        current = next;
    }
    Ok(())
}
