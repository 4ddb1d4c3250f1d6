//! RowID-keyed B+-tree backing a table's heap (spec §4.4).
//!
//! Grounded on nimbus's `storage::bplus_tree::BPlusTree` for the descend/
//! split shape (walk internal pages picking the child whose separator
//! brackets the search key, split a full leaf by moving its upper half to a
//! new right sibling and pushing a separator up to the parent, growing a new
//! root when the old root itself splits), generalized from nimbus's
//! fixed-width `u32` key to the spec's 64-bit `RowID` and from nimbus's
//! fixed-entry-count page to the variable-length-cell [`TableLeafPage`].
//! Underflow handling on delete mirrors nimbus's `DeleteResult`-driven
//! `delete_internal` (borrow from a sibling if one can spare a cell, else
//! merge and remove the separator from the parent, collapsing the root if it
//! is left with a single child), adapted from nimbus's fixed-size tuple
//! slots to this tree's variable-length cells and byte-budget fit checks.

use tracing::{debug, trace};

use crate::error::DbResult;
use crate::storage::freelist;
use crate::storage::page::base::{PageIdx, PageKind};
use crate::storage::page::header::PAGE_HEADER_SIZE;
use crate::storage::page::{self, PageView};
use crate::storage::pager::Pager;

fn usable_capacity() -> usize {
    crate::constants::PAGE_SIZE - PAGE_HEADER_SIZE
}

fn leaf_cells_size(cells: &[(u64, Vec<u8>)]) -> usize {
    cells.iter().map(|(_, b)| 8 + b.len() + 4).sum()
}

/// A leaf below half-full is due for a borrow or merge.
fn leaf_is_thin(cells: &[(u64, Vec<u8>)]) -> bool {
    leaf_cells_size(cells) * 2 < usable_capacity()
}

/// Mirrors the 16-bytes-per-cell budget `insert_into_parent` already uses
/// for its fit check.
fn internal_is_thin(num_cells: usize) -> bool {
    num_cells * 16 * 2 < usable_capacity()
}

pub struct TableTree {
    pub root: PageIdx,
}

impl TableTree {
    pub fn new(root: PageIdx) -> Self {
        Self { root }
    }

    pub fn seek(&self, pager: &mut Pager, row_id: u64) -> DbResult<Option<Vec<u8>>> {
        let leaf = self.find_leaf(pager, row_id)?;
        let buf = pager.fetch(leaf)?;
        let result = match page::view(buf) {
            PageView::TableLeaf(mut p) => match p.find(row_id) {
                Ok(idx) => Some(p.cell(idx).1.to_vec()),
                Err(_) => None,
            },
            _ => unreachable!("find_leaf always lands on a table leaf"),
        };
        pager.unpin(leaf, false);
        Ok(result)
    }

    /// Full forward scan, lowest row-ID first. `Pager` pins/unpins one leaf
    /// at a time rather than the whole tree, so this is safe to call with a
    /// huge table.
    pub fn scan(&self, pager: &mut Pager) -> DbResult<Vec<(u64, Vec<u8>)>> {
        let mut out = Vec::new();
        let mut leaf = self.leftmost_leaf(pager)?;
        loop {
            let buf = pager.fetch(leaf)?;
            let (next, rows) = match page::view(buf) {
                PageView::TableLeaf(mut p) => {
                    let n = p.num_cells();
                    let mut rows = Vec::with_capacity(n);
                    for i in 0..n {
                        let (row_id, bytes) = p.cell(i);
                        rows.push((row_id, bytes.to_vec()));
                    }
                    (p.slotted_next_page(), rows)
                }
                _ => unreachable!(),
            };
            out.extend(rows);
            pager.unpin(leaf, false);
            if next == 0 {
                break;
            }
            leaf = next;
        }
        Ok(out)
    }

    /// Overwrites `row_id`'s cell with `row_bytes` without touching the rest
    /// of the tree, for the UPDATE executor's in-place path (spec §4.9): the
    /// caller has already checked the new encoding is no larger than the
    /// old one, so the leaf that already held the row always has room for
    /// it. Returns `false` if `row_id` isn't present.
    pub fn update_in_place(&mut self, pager: &mut Pager, row_id: u64, row_bytes: &[u8]) -> DbResult<bool> {
        let leaf = self.find_leaf(pager, row_id)?;
        let buf = pager.fetch(leaf)?;
        let updated = match page::view(buf) {
            PageView::TableLeaf(mut p) => match p.find(row_id) {
                Ok(idx) => {
                    p.remove(idx);
                    let idx = p.find(row_id).unwrap_or_else(|idx| idx);
                    p.insert(idx, row_id, row_bytes);
                    true
                }
                Err(_) => false,
            },
            _ => unreachable!(),
        };
        pager.unpin(leaf, updated);
        Ok(updated)
    }

    pub fn insert(&mut self, pager: &mut Pager, row_id: u64, row_bytes: &[u8]) -> DbResult<()> {
        let mut path = Vec::new();
        let leaf = self.find_leaf_with_path(pager, row_id, &mut path)?;

        let buf = pager.fetch(leaf)?;
        let fits = match page::view(buf) {
            PageView::TableLeaf(mut p) => p.fits(row_bytes.len()),
            _ => unreachable!(),
        };

        if fits {
            match page::view(buf) {
                PageView::TableLeaf(mut p) => {
                    let idx = p.find(row_id).unwrap_or_else(|idx| idx);
                    p.insert(idx, row_id, row_bytes);
                }
                _ => unreachable!(),
            }
            pager.unpin(leaf, true);
            return Ok(());
        }

        self.split_leaf_and_insert(pager, leaf, row_id, row_bytes, path)
    }

    /// Removes `row_id`, rebalancing the tree on the way back up (spec
    /// §4.4): a leaf or internal node left below half-full borrows a cell
    /// from a sibling that can spare one without itself going thin, else
    /// merges with a sibling and drops the separator from the parent. A root
    /// left with a single child collapses into it, returning the old root's
    /// page to the free list.
    pub fn delete(&mut self, pager: &mut Pager, row_id: u64) -> DbResult<bool> {
        let mut path = Vec::new();
        let leaf = self.find_leaf_with_path(pager, row_id, &mut path)?;

        let buf = pager.fetch(leaf)?;
        let (removed, cells) = match page::view(buf) {
            PageView::TableLeaf(mut p) => match p.find(row_id) {
                Ok(idx) => {
                    let n = p.num_cells();
                    let mut cells: Vec<(u64, Vec<u8>)> =
                        (0..n).map(|i| { let (r, b) = p.cell(i); (r, b.to_vec()) }).collect();
                    cells.remove(idx);
                    (true, cells)
                }
                Err(_) => (false, Vec::new()),
            },
            _ => unreachable!(),
        };
        if !removed {
            pager.unpin(leaf, false);
            return Ok(false);
        }

        let thin = leaf_is_thin(&cells);
        match page::view(buf) {
            PageView::TableLeaf(mut p) => {
                let refs: Vec<(u64, &[u8])> = cells.iter().map(|(r, b)| (*r, b.as_slice())).collect();
                p.rebuild(&refs);
            }
            _ => unreachable!(),
        }
        pager.unpin(leaf, true);

        if thin && !path.is_empty() {
            self.fix_leaf_underflow(pager, leaf, path)?;
        }
        Ok(true)
    }

    fn fix_leaf_underflow(&mut self, pager: &mut Pager, node: PageIdx, mut path: Vec<PageIdx>) -> DbResult<()> {
        let Some(parent) = path.pop() else { return Ok(()) };

        let (mut pcells, mut tail) = read_internal(pager, parent)?;

        let mut children: Vec<PageIdx> = pcells.iter().map(|(_, c)| *c).collect();
        children.push(tail);
        let pos = children
            .iter()
            .position(|&c| c == node)
            .expect("node must be a child of its recorded parent");
        let left_sibling = (pos > 0).then(|| children[pos - 1]);
        let right_sibling = (pos + 1 < children.len()).then(|| children[pos + 1]);

        let mut node_cells = read_leaf(pager, node)?;

        // Borrow from the right sibling if it can spare its leftmost cell
        // without itself becoming thin.
        if let Some(right) = right_sibling {
            let right_cells = read_leaf(pager, right)?;
            if right_cells.len() > 1 {
                let mut shrunk = right_cells;
                let borrowed = shrunk.remove(0);
                if !leaf_is_thin(&shrunk) {
                    node_cells.push(borrowed);
                    let new_separator = shrunk[0].0;

                    write_leaf(pager, node, &node_cells)?;
                    write_leaf(pager, right, &shrunk)?;

                    pcells[pos].0 = new_separator;
                    write_internal(pager, parent, &pcells, tail)?;
                    return Ok(());
                }
            }
        }

        // Borrow from the left sibling's rightmost cell.
        if let Some(left) = left_sibling {
            let left_cells = read_leaf(pager, left)?;
            if left_cells.len() > 1 {
                let mut shrunk = left_cells;
                let borrowed = shrunk.pop().unwrap();
                if !leaf_is_thin(&shrunk) {
                    node_cells.insert(0, borrowed);
                    let new_separator = node_cells[0].0;

                    write_leaf(pager, left, &shrunk)?;
                    write_leaf(pager, node, &node_cells)?;

                    pcells[pos - 1].0 = new_separator;
                    write_internal(pager, parent, &pcells, tail)?;
                    return Ok(());
                }
            }
        }

        // Neither sibling can lend a cell: merge with one and drop the
        // separator between them from the parent.
        let (keep, drop_page, at) = if let Some(right) = right_sibling {
            (node, right, pos)
        } else if let Some(left) = left_sibling {
            (left, node, pos - 1)
        } else {
            return Ok(());
        };

        let drop_cells = read_leaf(pager, drop_page)?;
        let drop_next = {
            let buf = pager.fetch(drop_page)?;
            let next = match page::view(buf) {
                PageView::TableLeaf(mut p) => p.slotted_next_page(),
                _ => unreachable!(),
            };
            pager.unpin(drop_page, false);
            next
        };

        let mut merged = if keep == node { node_cells } else { read_leaf(pager, keep)? };
        merged.extend(drop_cells);

        let buf = pager.fetch(keep)?;
        match page::view(buf) {
            PageView::TableLeaf(mut p) => {
                let refs: Vec<(u64, &[u8])> = merged.iter().map(|(r, b)| (*r, b.as_slice())).collect();
                p.rebuild(&refs);
                p.slotted_set_next_page(drop_next);
            }
            _ => unreachable!(),
        }
        pager.unpin(keep, true);

        freelist::free_page(pager, drop_page)?;
        debug!(keep, drop_page, "merged table leaves on underflow");

        if at + 1 < pcells.len() {
            pcells[at + 1].1 = keep;
        } else {
            tail = keep;
        }
        pcells.remove(at);

        let parent_is_root = path.is_empty();
        if pcells.is_empty() && parent_is_root {
            freelist::free_page(pager, parent)?;
            self.root = tail;
            trace!(new_root = tail, "table tree root collapsed");
            return Ok(());
        }

        write_internal(pager, parent, &pcells, tail)?;
        if internal_is_thin(pcells.len()) && !parent_is_root {
            self.fix_internal_underflow(pager, parent, path)?;
        }
        Ok(())
    }

    fn fix_internal_underflow(&mut self, pager: &mut Pager, node: PageIdx, mut path: Vec<PageIdx>) -> DbResult<()> {
        let Some(parent) = path.pop() else { return Ok(()) };

        let (mut pcells, mut tail) = read_internal(pager, parent)?;

        let mut children: Vec<PageIdx> = pcells.iter().map(|(_, c)| *c).collect();
        children.push(tail);
        let pos = children
            .iter()
            .position(|&c| c == node)
            .expect("node must be a child of its recorded parent");
        let left_sibling = (pos > 0).then(|| children[pos - 1]);
        let right_sibling = (pos + 1 < children.len()).then(|| children[pos + 1]);

        let (mut node_cells, mut node_tail) = read_internal(pager, node)?;

        // Borrow the right sibling's leftmost child: the separator between
        // node and the sibling drops down to become node's new last cell
        // (keyed on node's old tail), and the borrowed child becomes node's
        // new tail.
        if let Some(right) = right_sibling {
            let (right_cells, right_tail) = read_internal(pager, right)?;
            if !right_cells.is_empty() {
                let mut shrunk = right_cells;
                let (borrowed_key, borrowed_child) = shrunk.remove(0);
                if !internal_is_thin(shrunk.len()) {
                    let separator = pcells[pos].0;
                    node_cells.push((separator, node_tail));
                    node_tail = borrowed_child;

                    write_internal(pager, node, &node_cells, node_tail)?;
                    write_internal(pager, right, &shrunk, right_tail)?;

                    pcells[pos].0 = borrowed_key;
                    write_internal(pager, parent, &pcells, tail)?;
                    return Ok(());
                }
            }
        }

        // Borrow the left sibling's rightmost child, symmetrically.
        if let Some(left) = left_sibling {
            let (left_cells, left_tail) = read_internal(pager, left)?;
            if !left_cells.is_empty() {
                let mut shrunk = left_cells;
                let (new_boundary_key, new_left_tail) = shrunk.pop().unwrap();
                if !internal_is_thin(shrunk.len()) {
                    let separator = pcells[pos - 1].0;
                    node_cells.insert(0, (separator, left_tail));

                    write_internal(pager, left, &shrunk, new_left_tail)?;
                    write_internal(pager, node, &node_cells, node_tail)?;

                    pcells[pos - 1].0 = new_boundary_key;
                    write_internal(pager, parent, &pcells, tail)?;
                    return Ok(());
                }
            }
        }

        // Merge with a sibling, pulling the parent's separator down as the
        // new boundary cell between the two halves.
        let (keep, drop_page, at) = if let Some(right) = right_sibling {
            (node, right, pos)
        } else if let Some(left) = left_sibling {
            (left, node, pos - 1)
        } else {
            return Ok(());
        };
        let separator = pcells[at].0;

        let (mut keep_cells, keep_tail, drop_cells, drop_tail) = if keep == node {
            let (r_cells, r_tail) = read_internal(pager, drop_page)?;
            (node_cells, node_tail, r_cells, r_tail)
        } else {
            let (l_cells, l_tail) = read_internal(pager, keep)?;
            (l_cells, l_tail, node_cells, node_tail)
        };
        keep_cells.push((separator, keep_tail));
        keep_cells.extend(drop_cells);

        write_internal(pager, keep, &keep_cells, drop_tail)?;
        freelist::free_page(pager, drop_page)?;
        debug!(keep, drop_page, "merged table internal nodes on underflow");

        if at + 1 < pcells.len() {
            pcells[at + 1].1 = keep;
        } else {
            tail = keep;
        }
        pcells.remove(at);

        let parent_is_root = path.is_empty();
        if pcells.is_empty() && parent_is_root {
            freelist::free_page(pager, parent)?;
            self.root = tail;
            trace!(new_root = tail, "table tree root collapsed");
            return Ok(());
        }

        write_internal(pager, parent, &pcells, tail)?;
        if internal_is_thin(pcells.len()) && !parent_is_root {
            self.fix_internal_underflow(pager, parent, path)?;
        }
        Ok(())
    }

    fn find_leaf(&self, pager: &mut Pager, row_id: u64) -> DbResult<PageIdx> {
        self.find_leaf_with_path(pager, row_id, &mut Vec::new())
    }

    fn find_leaf_with_path(
        &self,
        pager: &mut Pager,
        row_id: u64,
        path: &mut Vec<PageIdx>,
    ) -> DbResult<PageIdx> {
        let mut current = self.root;
        loop {
            let buf = pager.fetch(current)?;
            let next = match page::view(buf) {
                PageView::TableLeaf(_) => {
                    pager.unpin(current, false);
                    return Ok(current);
                }
                PageView::TableInternal(mut p) => p.child_for(row_id),
                _ => unreachable!("table tree only contains leaf/internal pages"),
            };
            pager.unpin(current, false);
            path.push(current);
            current = next;
        }
    }

    fn leftmost_leaf(&self, pager: &mut Pager) -> DbResult<PageIdx> {
        let mut current = self.root;
        loop {
            let buf = pager.fetch(current)?;
            let next = match page::view(buf) {
                PageView::TableLeaf(_) => {
                    pager.unpin(current, false);
                    return Ok(current);
                }
                PageView::TableInternal(mut p) => {
                    if p.num_cells() > 0 {
                        p.cell(0).1
                    } else {
                        p.right_child()
                    }
                }
                _ => unreachable!(),
            };
            pager.unpin(current, false);
            current = next;
        }
    }

    fn split_leaf_and_insert(
        &mut self,
        pager: &mut Pager,
        leaf: PageIdx,
        row_id: u64,
        row_bytes: &[u8],
        mut path: Vec<PageIdx>,
    ) -> DbResult<()> {
        let (right_idx, separator) = {
            let buf = pager.fetch(leaf)?;
            let (mut cells, old_next) = match page::view(buf) {
                PageView::TableLeaf(mut p) => {
                    let n = p.num_cells();
                    let mut cells: Vec<(u64, Vec<u8>)> = (0..n)
                        .map(|i| {
                            let (rid, bytes) = p.cell(i);
                            (rid, bytes.to_vec())
                        })
                        .collect();
                    (cells, p.slotted_next_page())
                }
                _ => unreachable!(),
            };
            let insert_at = cells.partition_point(|(rid, _)| *rid < row_id);
            cells.insert(insert_at, (row_id, row_bytes.to_vec()));

            let mid = cells.len() / 2;
            let right_cells = cells.split_off(mid);
            let separator = right_cells[0].0;

            let (right_idx, right_buf) = pager.new_page(PageKind::TableLeaf)?;
            match page::view(right_buf) {
                PageView::TableLeaf(mut p) => {
                    let refs: Vec<(u64, &[u8])> =
                        right_cells.iter().map(|(r, b)| (*r, b.as_slice())).collect();
                    p.rebuild(&refs);
                    p.slotted_set_next_page(old_next);
                }
                _ => unreachable!(),
            }
            pager.unpin(right_idx, true);

            let buf = pager.fetch(leaf)?;
            match page::view(buf) {
                PageView::TableLeaf(mut p) => {
                    let refs: Vec<(u64, &[u8])> = cells.iter().map(|(r, b)| (*r, b.as_slice())).collect();
                    p.rebuild(&refs);
                    p.slotted_set_next_page(right_idx);
                }
                _ => unreachable!(),
            }
            pager.unpin(leaf, true);
            debug!(leaf, right_idx, separator, "split table leaf");
            (right_idx, separator)
        };

        self.insert_into_parent(pager, leaf, separator, right_idx, &mut path)
    }

    /// Inserts `(separator, right_child)` into the parent of `left_child` on
    /// `path`, splitting the parent in turn (and possibly growing a new
    /// root) if it doesn't fit.
    fn insert_into_parent(
        &mut self,
        pager: &mut Pager,
        left_child: PageIdx,
        separator: u64,
        right_child: PageIdx,
        path: &mut Vec<PageIdx>,
    ) -> DbResult<()> {
        let Some(parent) = path.pop() else {
            // left_child was the root; grow a new root above both halves.
            let (new_root, buf) = pager.new_page(PageKind::TableInternal)?;
            match page::view(buf) {
                PageView::TableInternal(mut p) => {
                    p.insert(0, separator, left_child);
                    p.set_right_child(right_child);
                }
                _ => unreachable!(),
            }
            pager.unpin(new_root, true);
            self.root = new_root;
            trace!(new_root, "table tree grew a new root");
            return Ok(());
        };

        let buf = pager.fetch(parent)?;
        let (mut cells, mut tail) = match page::view(buf) {
            PageView::TableInternal(mut p) => {
                let n = p.num_cells();
                ((0..n).map(|i| p.cell(i)).collect::<Vec<_>>(), p.right_child())
            }
            _ => unreachable!(),
        };
        patch_and_insert(&mut cells, &mut tail, separator, left_child, right_child);

        let fits = {
            let needed: usize = cells.len() * 16; // 12-byte cell + 4-byte slot entry each
            needed <= crate::constants::PAGE_SIZE - PAGE_HEADER_SIZE
        };

        if fits {
            match page::view(buf) {
                PageView::TableInternal(mut p) => p.rebuild(&cells, tail),
                _ => unreachable!(),
            }
            pager.unpin(parent, true);
            return Ok(());
        }

        let mid = cells.len() / 2;
        let up_separator = cells[mid].0;
        let left_right_child = cells[mid].1;
        let right_cells = cells.split_off(mid + 1);
        let left_cells = cells;

        match page::view(buf) {
            PageView::TableInternal(mut p) => p.rebuild(&left_cells, left_right_child),
            _ => unreachable!(),
        }
        pager.unpin(parent, true);

        let (new_right, buf) = pager.new_page(PageKind::TableInternal)?;
        match page::view(buf) {
            PageView::TableInternal(mut p) => p.rebuild(&right_cells, tail),
            _ => unreachable!(),
        }
        pager.unpin(new_right, true);

        self.insert_into_parent(pager, parent, up_separator, new_right, path)
    }
}

/// Inserts `(separator, left_child)` into an internal page's cell list,
/// preserving the invariant that each cell's child covers keys less than its
/// separator: the cell (or `tail`) that used to route to `left_child` is
/// rewritten to route to `right_child` instead, since `left_child` now only
/// covers the keys below the new separator.
fn patch_and_insert(
    cells: &mut Vec<(u64, PageIdx)>,
    tail: &mut PageIdx,
    separator: u64,
    left_child: PageIdx,
    right_child: PageIdx,
) {
    let insert_at = cells.partition_point(|(sep, _)| *sep < separator);
    cells.insert(insert_at, (separator, left_child));
    if insert_at + 1 < cells.len() {
        cells[insert_at + 1].1 = right_child;
    } else {
        *tail = right_child;
    }
}

fn read_leaf(pager: &mut Pager, idx: PageIdx) -> DbResult<Vec<(u64, Vec<u8>)>> {
    let buf = pager.fetch(idx)?;
    let cells = match page::view(buf) {
        PageView::TableLeaf(mut p) => {
            let n = p.num_cells();
            (0..n).map(|i| { let (r, b) = p.cell(i); (r, b.to_vec()) }).collect()
        }
        _ => unreachable!(),
    };
    pager.unpin(idx, false);
    Ok(cells)
}

fn write_leaf(pager: &mut Pager, idx: PageIdx, cells: &[(u64, Vec<u8>)]) -> DbResult<()> {
    let buf = pager.fetch(idx)?;
    match page::view(buf) {
        PageView::TableLeaf(mut p) => {
            let refs: Vec<(u64, &[u8])> = cells.iter().map(|(r, b)| (*r, b.as_slice())).collect();
            p.rebuild(&refs);
        }
        _ => unreachable!(),
    }
    pager.unpin(idx, true);
    Ok(())
}

fn read_internal(pager: &mut Pager, idx: PageIdx) -> DbResult<(Vec<(u64, PageIdx)>, PageIdx)> {
    let buf = pager.fetch(idx)?;
    let result = match page::view(buf) {
        PageView::TableInternal(mut p) => {
            let n = p.num_cells();
            ((0..n).map(|i| p.cell(i)).collect(), p.right_child())
        }
        _ => unreachable!(),
    };
    pager.unpin(idx, false);
    Ok(result)
}

fn write_internal(pager: &mut Pager, idx: PageIdx, cells: &[(u64, PageIdx)], tail: PageIdx) -> DbResult<()> {
    let buf = pager.fetch(idx)?;
    match page::view(buf) {
        PageView::TableInternal(mut p) => p.rebuild(cells, tail),
        _ => unreachable!(),
    }
    pager.unpin(idx, true);
    Ok(())
}
