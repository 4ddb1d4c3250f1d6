pub mod base;
pub mod btree_page;
pub mod header;
pub mod overflow;
pub mod slotted;

pub use base::{PageBuf, PageIdx, PageKind};

use base::page_kind_of;
use btree_page::{IndexInternalPage, IndexLeafPage, TableInternalPage, TableLeafPage};
use overflow::OverflowPage;
use slotted::SlottedPage;

/// Dispatches a raw page buffer to its typed view by the tag byte at offset
/// 0, mirroring nimbus's `Page` enum in `storage::page::base`.
pub enum PageView<'a> {
    TableLeaf(TableLeafPage<'a>),
    TableInternal(TableInternalPage<'a>),
    IndexLeaf(IndexLeafPage<'a>),
    IndexInternal(IndexInternalPage<'a>),
    Overflow(OverflowPage<'a>),
    Free,
}

pub fn view(buf: &mut PageBuf) -> PageView<'_> {
    match page_kind_of(buf) {
        Some(PageKind::TableLeaf) => PageView::TableLeaf(TableLeafPage::new(SlottedPage::new(buf))),
        Some(PageKind::TableInternal) => {
            PageView::TableInternal(TableInternalPage::new(SlottedPage::new(buf)))
        }
        Some(PageKind::IndexLeaf) => PageView::IndexLeaf(IndexLeafPage::new(SlottedPage::new(buf))),
        Some(PageKind::IndexInternal) => {
            PageView::IndexInternal(IndexInternalPage::new(SlottedPage::new(buf)))
        }
        Some(PageKind::Overflow) => PageView::Overflow(OverflowPage::new(buf)),
        _ => PageView::Free,
    }
}
