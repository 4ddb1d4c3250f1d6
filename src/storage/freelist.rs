//! Free-page list threaded through the database header (spec §6).
//!
//! Freed pages are pushed onto a singly linked list rooted at the
//! `DatabaseHeader`'s `first_free_page`, using each freed page's own common
//! header `next_page` field to chain to the next free page. Allocation pops
//! this list before extending the file, so dropping a table or an overflow
//! chain lets a later `CREATE TABLE`/long text value reuse the space instead
//! of growing the file forever.

use crate::constants::HEADER_PAGE_IDX;
use crate::error::DbResult;
use crate::storage::page::base::{PageIdx, PageKind};
use crate::storage::page::header::{DatabaseHeader, PageHeader};
use crate::storage::pager::Pager;

/// Pops a page off the free list and re-tags it as `kind`, falling back to
/// extending the file when the list is empty.
pub fn alloc_page(pager: &mut Pager, kind: PageKind) -> DbResult<PageIdx> {
    let header = {
        let buf = pager.fetch(HEADER_PAGE_IDX)?;
        let header = DatabaseHeader::decode(buf).expect("header page must decode");
        pager.unpin(HEADER_PAGE_IDX, false);
        header
    };

    if header.first_free_page == 0 {
        let (idx, _) = pager.new_page(kind)?;
        pager.unpin(idx, true);
        return Ok(idx);
    }

    let freed = header.first_free_page;
    let next = {
        let buf = pager.fetch(freed)?;
        let next = PageHeader::new(&mut buf[..]).next_page();
        PageHeader::new(&mut buf[..]).init(kind);
        pager.unpin(freed, true);
        next
    };

    let mut header = header;
    header.first_free_page = next;
    header.free_page_count = header.free_page_count.saturating_sub(1);
    {
        let buf = pager.fetch(HEADER_PAGE_IDX)?;
        header.encode(buf);
        pager.unpin(HEADER_PAGE_IDX, true);
    }
    Ok(freed)
}

/// Pushes `idx` onto the head of the free list and retags it `Free`.
pub fn free_page(pager: &mut Pager, idx: PageIdx) -> DbResult<()> {
    let mut header = {
        let buf = pager.fetch(HEADER_PAGE_IDX)?;
        let header = DatabaseHeader::decode(buf).expect("header page must decode");
        pager.unpin(HEADER_PAGE_IDX, false);
        header
    };

    let old_head = header.first_free_page;
    header.first_free_page = idx;
    header.free_page_count += 1;
    {
        let buf = pager.fetch(HEADER_PAGE_IDX)?;
        header.encode(buf);
        pager.unpin(HEADER_PAGE_IDX, true);
    }
    {
        let buf = pager.fetch(idx)?;
        let mut h = PageHeader::new(&mut buf[..]);
        h.init(PageKind::Free);
        h.set_next_page(old_head);
        pager.unpin(idx, true);
    }
    Ok(())
}
