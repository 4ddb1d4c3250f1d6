//! Cell codecs for the four B-tree page kinds, built on the generic
//! [`SlottedPage`] directory.
//!
//! Grounded on nimbus's `storage::page::{bplus_leaf, bplus_inner}`: leaf cells
//! pair a key with a payload, internal cells pair a separator key with a
//! child page pointer and the last child hangs off the header instead of a
//! cell. nimbus's leaf only ever stores a fixed-width `RowID` key and an
//! `Overflow`-capable value slot for one row; this generalizes the leaf cell
//! to the table B-tree's `(RowID, row bytes)` shape and a distinct index leaf
//! cell shape carrying a generic key and a small inline row-ID set (spec
//! §4.5's non-unique index fan-out).

use std::cmp::Ordering;

use crate::storage::page::base::PageIdx;
use crate::storage::page::slotted::SlottedPage;

/// `(row_id, row_bytes)` cell of a table-tree leaf page.
pub struct TableLeafPage<'a> {
    slotted: SlottedPage<'a>,
}

impl<'a> TableLeafPage<'a> {
    pub fn new(slotted: SlottedPage<'a>) -> Self {
        Self { slotted }
    }

    pub fn num_cells(&mut self) -> usize {
        self.slotted.num_cells()
    }

    pub fn cell(&mut self, idx: usize) -> (u64, &[u8]) {
        decode_table_leaf_cell(self.slotted.cell_at(idx))
    }

    pub fn find(&mut self, row_id: u64) -> Result<usize, usize> {
        self.slotted
            .binary_search(|cell| decode_table_leaf_cell(cell).0.cmp(&row_id))
    }

    pub fn fits(&mut self, row_bytes_len: usize) -> bool {
        self.slotted.fits(8 + row_bytes_len)
    }

    pub fn insert(&mut self, idx: usize, row_id: u64, row_bytes: &[u8]) {
        let mut cell = Vec::with_capacity(8 + row_bytes.len());
        cell.extend_from_slice(&row_id.to_le_bytes());
        cell.extend_from_slice(row_bytes);
        self.slotted.insert_at(idx, &cell);
    }

    pub fn remove(&mut self, idx: usize) {
        self.slotted.remove_at(idx);
    }

    pub fn free_space(&mut self) -> usize {
        self.slotted.free_space()
    }

    /// The sibling leaf to the right, 0 if this is the rightmost leaf.
    pub fn slotted_next_page(&mut self) -> PageIdx {
        self.slotted.header_next_page()
    }

    pub fn slotted_set_next_page(&mut self, next: PageIdx) {
        self.slotted.set_header_next_page(next)
    }

    pub fn rebuild(&mut self, cells: &[(u64, &[u8])]) {
        let encoded: Vec<Vec<u8>> = cells
            .iter()
            .map(|(row_id, bytes)| {
                let mut v = Vec::with_capacity(8 + bytes.len());
                v.extend_from_slice(&row_id.to_le_bytes());
                v.extend_from_slice(bytes);
                v
            })
            .collect();
        let refs: Vec<&[u8]> = encoded.iter().map(|v| v.as_slice()).collect();
        self.slotted.rebuild(true, &refs);
    }
}

fn decode_table_leaf_cell(cell: &[u8]) -> (u64, &[u8]) {
    let row_id = u64::from_le_bytes(cell[0..8].try_into().unwrap());
    (row_id, &cell[8..])
}

/// `(separator_row_id, child_page)` cell of a table-tree internal page. The
/// page header's `right_child` holds the pointer for keys above every
/// separator.
pub struct TableInternalPage<'a> {
    slotted: SlottedPage<'a>,
}

impl<'a> TableInternalPage<'a> {
    pub fn new(slotted: SlottedPage<'a>) -> Self {
        Self { slotted }
    }

    pub fn num_cells(&mut self) -> usize {
        self.slotted.num_cells()
    }

    pub fn cell(&mut self, idx: usize) -> (u64, PageIdx) {
        let bytes = self.slotted.cell_at(idx);
        (
            u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        )
    }

    /// Finds the child pointer to descend into for `row_id`: the first
    /// separator strictly greater than `row_id`, or the rightmost child.
    pub fn child_for(&mut self, row_id: u64) -> PageIdx {
        let n = self.num_cells();
        for i in 0..n {
            let (sep, child) = self.cell(i);
            if row_id < sep {
                return child;
            }
        }
        self.right_child()
    }

    pub fn right_child(&mut self) -> PageIdx {
        self.slotted.header_right_child()
    }

    pub fn set_right_child(&mut self, child: PageIdx) {
        self.slotted.set_header_right_child(child);
    }

    pub fn insert(&mut self, idx: usize, separator: u64, child: PageIdx) {
        let mut cell = [0u8; 12];
        cell[0..8].copy_from_slice(&separator.to_le_bytes());
        cell[8..12].copy_from_slice(&child.to_le_bytes());
        self.slotted.insert_at(idx, &cell);
    }

    pub fn remove(&mut self, idx: usize) {
        self.slotted.remove_at(idx);
    }

    pub fn fits(&mut self) -> bool {
        self.slotted.fits(12)
    }

    pub fn rebuild(&mut self, cells: &[(u64, PageIdx)], right_child: PageIdx) {
        let encoded: Vec<[u8; 12]> = cells
            .iter()
            .map(|(sep, child)| {
                let mut c = [0u8; 12];
                c[0..8].copy_from_slice(&sep.to_le_bytes());
                c[8..12].copy_from_slice(&child.to_le_bytes());
                c
            })
            .collect();
        let refs: Vec<&[u8]> = encoded.iter().map(|c| c.as_slice()).collect();
        self.slotted.rebuild(true, &refs);
        self.set_right_child(right_child);
    }
}

/// `(key_len, key_bytes, num_row_ids, row_ids[..], overflow_page)` cell of an
/// index-tree leaf page. `overflow_page == 0` means no overflow chain of
/// extra row-IDs beyond the inline budget.
pub struct IndexLeafPage<'a> {
    slotted: SlottedPage<'a>,
}

impl<'a> IndexLeafPage<'a> {
    pub fn new(slotted: SlottedPage<'a>) -> Self {
        Self { slotted }
    }

    pub fn num_cells(&mut self) -> usize {
        self.slotted.num_cells()
    }

    pub fn cell(&mut self, idx: usize) -> IndexLeafCell {
        decode_index_leaf_cell(self.slotted.cell_at(idx))
    }

    pub fn find_by(&mut self, mut cmp: impl FnMut(&[u8]) -> Ordering) -> Result<usize, usize> {
        self.slotted
            .binary_search(|cell| cmp(decode_index_leaf_cell(cell).key_bytes))
    }

    pub fn fits(&mut self, payload_len: usize) -> bool {
        self.slotted.fits(payload_len)
    }

    pub fn insert(&mut self, idx: usize, key_bytes: &[u8], row_ids: &[u64], overflow_page: PageIdx) {
        let encoded = encode_index_leaf_cell(key_bytes, row_ids, overflow_page);
        self.slotted.insert_at(idx, &encoded);
    }

    pub fn remove(&mut self, idx: usize) {
        self.slotted.remove_at(idx);
    }

    pub fn free_space(&mut self) -> usize {
        self.slotted.free_space()
    }

    pub fn slotted_next_page(&mut self) -> PageIdx {
        self.slotted.header_next_page()
    }

    pub fn slotted_set_next_page(&mut self, next: PageIdx) {
        self.slotted.set_header_next_page(next)
    }

    pub fn rebuild(&mut self, cells: &[(&[u8], Vec<u64>, PageIdx)]) {
        let encoded: Vec<Vec<u8>> = cells
            .iter()
            .map(|(k, rids, ov)| encode_index_leaf_cell(k, rids, *ov))
            .collect();
        let refs: Vec<&[u8]> = encoded.iter().map(|v| v.as_slice()).collect();
        self.slotted.rebuild(true, &refs);
    }
}

pub struct IndexLeafCell<'a> {
    pub key_bytes: &'a [u8],
    pub row_ids: Vec<u64>,
    pub overflow_page: PageIdx,
}

fn encode_index_leaf_cell(key_bytes: &[u8], row_ids: &[u64], overflow_page: PageIdx) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + key_bytes.len() + 2 + row_ids.len() * 8 + 4);
    out.extend_from_slice(&(key_bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(key_bytes);
    out.extend_from_slice(&(row_ids.len() as u16).to_le_bytes());
    for rid in row_ids {
        out.extend_from_slice(&rid.to_le_bytes());
    }
    out.extend_from_slice(&overflow_page.to_le_bytes());
    out
}

fn decode_index_leaf_cell(cell: &[u8]) -> IndexLeafCell<'_> {
    let key_len = u16::from_le_bytes(cell[0..2].try_into().unwrap()) as usize;
    let key_bytes = &cell[2..2 + key_len];
    let mut cursor = 2 + key_len;
    let num_row_ids = u16::from_le_bytes(cell[cursor..cursor + 2].try_into().unwrap()) as usize;
    cursor += 2;
    let mut row_ids = Vec::with_capacity(num_row_ids);
    for _ in 0..num_row_ids {
        row_ids.push(u64::from_le_bytes(cell[cursor..cursor + 8].try_into().unwrap()));
        cursor += 8;
    }
    let overflow_page = u32::from_le_bytes(cell[cursor..cursor + 4].try_into().unwrap());
    IndexLeafCell {
        key_bytes,
        row_ids,
        overflow_page,
    }
}

/// `(key_len, key_bytes, child_page)` cell of an index-tree internal page.
pub struct IndexInternalPage<'a> {
    slotted: SlottedPage<'a>,
}

impl<'a> IndexInternalPage<'a> {
    pub fn new(slotted: SlottedPage<'a>) -> Self {
        Self { slotted }
    }

    pub fn num_cells(&mut self) -> usize {
        self.slotted.num_cells()
    }

    pub fn cell(&mut self, idx: usize) -> (&[u8], PageIdx) {
        decode_index_internal_cell(self.slotted.cell_at(idx))
    }

    pub fn child_for(&mut self, mut cmp: impl FnMut(&[u8]) -> Ordering) -> PageIdx {
        let n = self.num_cells();
        for i in 0..n {
            let (key, child) = self.cell(i);
            if cmp(key) == Ordering::Less {
                return child;
            }
        }
        self.right_child()
    }

    pub fn right_child(&mut self) -> PageIdx {
        self.slotted.header_right_child()
    }

    pub fn set_right_child(&mut self, child: PageIdx) {
        self.slotted.set_header_right_child(child);
    }

    pub fn fits(&mut self, key_bytes_len: usize) -> bool {
        self.slotted.fits(2 + key_bytes_len + 4)
    }

    pub fn insert(&mut self, idx: usize, key_bytes: &[u8], child: PageIdx) {
        let cell = encode_index_internal_cell(key_bytes, child);
        self.slotted.insert_at(idx, &cell);
    }

    pub fn remove(&mut self, idx: usize) {
        self.slotted.remove_at(idx);
    }

    pub fn rebuild(&mut self, cells: &[(&[u8], PageIdx)], right_child: PageIdx) {
        let encoded: Vec<Vec<u8>> = cells
            .iter()
            .map(|(k, child)| encode_index_internal_cell(k, *child))
            .collect();
        let refs: Vec<&[u8]> = encoded.iter().map(|v| v.as_slice()).collect();
        self.slotted.rebuild(true, &refs);
        self.set_right_child(right_child);
    }
}

fn encode_index_internal_cell(key_bytes: &[u8], child: PageIdx) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + key_bytes.len() + 4);
    out.extend_from_slice(&(key_bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(key_bytes);
    out.extend_from_slice(&child.to_le_bytes());
    out
}

fn decode_index_internal_cell(cell: &[u8]) -> (&[u8], PageIdx) {
    let key_len = u16::from_le_bytes(cell[0..2].try_into().unwrap()) as usize;
    let key_bytes = &cell[2..2 + key_len];
    let child = u32::from_le_bytes(cell[2 + key_len..2 + key_len + 4].try_into().unwrap());
    (key_bytes, child)
}
