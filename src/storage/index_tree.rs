//! Generic-key index B-tree (spec §4.5).
//!
//! nimbus's catalog builds one fixed-width, unique-only integer index B-tree
//! per indexed column (`catalog::manager::Catalog::insert_tuple`'s
//! `key_bytes` match arms). This generalizes that into one tree type keyed by
//! [`IndexKey`] (so composite and text keys work the same way integers did)
//! and adds the non-unique case nimbus never needed: a leaf cell can carry a
//! small inline row-ID set, spilling into an overflow chain (reusing the
//! same [`OverflowPage`] format text values spill into) once it outgrows
//! [`INLINE_ROWID_BUDGET`]. Underflow handling on delete mirrors nimbus's
//! `DeleteResult`-driven `delete_internal` (borrow from a sibling, else merge
//! and drop the separator from the parent, collapsing the root if left with
//! a single child), adapted to this tree's byte-key cells.

use std::cmp::Ordering;

use tracing::{debug, trace};

use crate::constants::INLINE_ROWID_BUDGET;
use crate::error::{DbError, DbResult};
use crate::key::{IndexKey, IndexKeyKind};
use crate::storage::freelist;
use crate::storage::page::base::{PageIdx, PageKind};
use crate::storage::page::header::PAGE_HEADER_SIZE;
use crate::storage::page::overflow::OverflowPage;
use crate::storage::page::{self, PageView};
use crate::storage::pager::Pager;

type LeafCell = (Vec<u8>, Vec<u64>, PageIdx);
type InternalCell = (Vec<u8>, PageIdx);

fn usable_capacity() -> usize {
    crate::constants::PAGE_SIZE - PAGE_HEADER_SIZE
}

fn leaf_cells_size(cells: &[LeafCell]) -> usize {
    cells
        .iter()
        .map(|(k, r, _)| 2 + k.len() + 2 + r.len() * 8 + 4 + 4)
        .sum()
}

fn leaf_is_thin(cells: &[LeafCell]) -> bool {
    leaf_cells_size(cells) * 2 < usable_capacity()
}

fn internal_cells_size(cells: &[InternalCell]) -> usize {
    cells.iter().map(|(k, _)| 2 + k.len() + 4 + 4).sum()
}

fn internal_is_thin(cells: &[InternalCell]) -> bool {
    internal_cells_size(cells) * 2 < usable_capacity()
}

pub struct IndexTree {
    pub root: PageIdx,
    pub key_kinds: Vec<IndexKeyKind>,
    pub unique: bool,
    pub name: String,
}

impl IndexTree {
    pub fn new(root: PageIdx, key_kinds: Vec<IndexKeyKind>, unique: bool, name: String) -> Self {
        Self {
            root,
            key_kinds,
            unique,
            name,
        }
    }

    fn cmp_encoded(&self, encoded: &[u8], key: &IndexKey) -> Ordering {
        let (decoded, _) = IndexKey::decode(encoded, &self.key_kinds);
        decoded.cmp(key)
    }

    /// Row-IDs stored under `key`, reading past the inline budget into the
    /// overflow chain if one is attached.
    pub fn seek(&self, pager: &mut Pager, key: &IndexKey) -> DbResult<Vec<u64>> {
        let leaf = self.find_leaf(pager, key)?;
        let buf = pager.fetch(leaf)?;
        let result = match page::view(buf) {
            PageView::IndexLeaf(mut p) => {
                match p.find_by(|bytes| self.cmp_encoded(bytes, key)) {
                    Ok(idx) => {
                        let cell = p.cell(idx);
                        (cell.row_ids.clone(), cell.overflow_page)
                    }
                    Err(_) => (Vec::new(), 0),
                }
            }
            _ => unreachable!(),
        };
        pager.unpin(leaf, false);
        let (mut row_ids, overflow_page) = result;
        if overflow_page != 0 {
            row_ids.extend(self.read_overflow_row_ids(pager, overflow_page)?);
        }
        Ok(row_ids)
    }

    pub fn insert(&mut self, pager: &mut Pager, key: &IndexKey, row_id: u64) -> DbResult<()> {
        let key_bytes = key.encode();
        let leaf = self.find_leaf(pager, key)?;
        let buf = pager.fetch(leaf)?;

        let (action, idx) = match page::view(buf) {
            PageView::IndexLeaf(mut p) => {
                match p.find_by(|bytes| self.cmp_encoded(bytes, key)) {
                    Ok(idx) => {
                        if self.unique {
                            pager.unpin(leaf, false);
                            return Err(DbError::DuplicateKey {
                                index: self.name.clone(),
                                key: format!("{key:?}"),
                            });
                        }
                        (CellAction::Extend, idx)
                    }
                    Err(idx) => (CellAction::New, idx),
                }
            }
            _ => unreachable!(),
        };

        match action {
            CellAction::New => {
                let fits = match page::view(buf) {
                    PageView::IndexLeaf(mut p) => p.fits(2 + key_bytes.len() + 2 + 8 + 4),
                    _ => unreachable!(),
                };
                if fits {
                    match page::view(buf) {
                        PageView::IndexLeaf(mut p) => p.insert(idx, &key_bytes, &[row_id], 0),
                        _ => unreachable!(),
                    }
                    pager.unpin(leaf, true);
                    return Ok(());
                }
                pager.unpin(leaf, false);
                self.split_leaf_and_insert(pager, leaf, &key_bytes, vec![row_id], 0)
            }
            CellAction::Extend => {
                let existing = match page::view(buf) {
                    PageView::IndexLeaf(mut p) => {
                        let c = p.cell(idx);
                        (c.row_ids.clone(), c.overflow_page)
                    }
                    _ => unreachable!(),
                };
                let (mut row_ids, mut overflow_page) = existing;
                if row_ids.len() < INLINE_ROWID_BUDGET {
                    row_ids.push(row_id);
                    match page::view(buf) {
                        PageView::IndexLeaf(mut p) => {
                            p.remove(idx);
                            p.insert(idx, &key_bytes, &row_ids, overflow_page);
                        }
                        _ => unreachable!(),
                    }
                    pager.unpin(leaf, true);
                    Ok(())
                } else {
                    pager.unpin(leaf, false);
                    overflow_page = self.append_overflow_row_id(pager, overflow_page, row_id)?;
                    let buf = pager.fetch(leaf)?;
                    match page::view(buf) {
                        PageView::IndexLeaf(mut p) => {
                            p.remove(idx);
                            p.insert(idx, &key_bytes, &row_ids, overflow_page);
                        }
                        _ => unreachable!(),
                    }
                    pager.unpin(leaf, true);
                    Ok(())
                }
            }
        }
    }

    /// Removes `row_id` from `key`'s cell, rebalancing leaf/internal pages
    /// left below half-full the same way [`crate::storage::table_tree::TableTree::delete`]
    /// does: borrow a cell from a sibling that can spare one, else merge and
    /// drop the separator from the parent, collapsing the root if it is left
    /// with a single child.
    pub fn delete(&mut self, pager: &mut Pager, key: &IndexKey, row_id: u64) -> DbResult<bool> {
        let mut path = Vec::new();
        let leaf = self.find_leaf_with_path(pager, key, &mut path)?;

        let buf = pager.fetch(leaf)?;
        let (removed, cells) = match page::view(buf) {
            PageView::IndexLeaf(mut p) => match p.find_by(|bytes| self.cmp_encoded(bytes, key)) {
                Ok(idx) => {
                    let n = p.num_cells();
                    let mut cells: Vec<LeafCell> = (0..n)
                        .map(|i| {
                            let c = p.cell(i);
                            (c.key_bytes.to_vec(), c.row_ids, c.overflow_page)
                        })
                        .collect();
                    let before = cells[idx].1.len();
                    cells[idx].1.retain(|&r| r != row_id);
                    let removed = cells[idx].1.len() != before;
                    if cells[idx].1.is_empty() && cells[idx].2 == 0 {
                        cells.remove(idx);
                    }
                    (removed, cells)
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
            PageView::IndexLeaf(mut p) => {
                let refs: Vec<(&[u8], Vec<u64>, PageIdx)> =
                    cells.iter().map(|(k, r, o)| (k.as_slice(), r.clone(), *o)).collect();
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

        if let Some(right) = right_sibling {
            let right_cells = read_leaf(pager, right)?;
            if right_cells.len() > 1 {
                let mut shrunk = right_cells;
                let borrowed = shrunk.remove(0);
                if !leaf_is_thin(&shrunk) {
                    node_cells.push(borrowed);
                    let new_separator = shrunk[0].0.clone();

                    write_leaf(pager, node, &node_cells)?;
                    write_leaf(pager, right, &shrunk)?;

                    pcells[pos].0 = new_separator;
                    write_internal(pager, parent, &pcells, tail)?;
                    return Ok(());
                }
            }
        }

        if let Some(left) = left_sibling {
            let left_cells = read_leaf(pager, left)?;
            if left_cells.len() > 1 {
                let mut shrunk = left_cells;
                let borrowed = shrunk.pop().unwrap();
                if !leaf_is_thin(&shrunk) {
                    node_cells.insert(0, borrowed);
                    let new_separator = node_cells[0].0.clone();

                    write_leaf(pager, left, &shrunk)?;
                    write_leaf(pager, node, &node_cells)?;

                    pcells[pos - 1].0 = new_separator;
                    write_internal(pager, parent, &pcells, tail)?;
                    return Ok(());
                }
            }
        }

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
                PageView::IndexLeaf(mut p) => p.slotted_next_page(),
                _ => unreachable!(),
            };
            pager.unpin(drop_page, false);
            next
        };

        let mut merged = if keep == node { node_cells } else { read_leaf(pager, keep)? };
        merged.extend(drop_cells);

        let buf = pager.fetch(keep)?;
        match page::view(buf) {
            PageView::IndexLeaf(mut p) => {
                let refs: Vec<(&[u8], Vec<u64>, PageIdx)> =
                    merged.iter().map(|(k, r, o)| (k.as_slice(), r.clone(), *o)).collect();
                p.rebuild(&refs);
                p.slotted_set_next_page(drop_next);
            }
            _ => unreachable!(),
        }
        pager.unpin(keep, true);

        freelist::free_page(pager, drop_page)?;
        debug!(keep, drop_page, "merged index leaves on underflow");

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
            trace!(new_root = tail, "index tree root collapsed");
            return Ok(());
        }

        write_internal(pager, parent, &pcells, tail)?;
        if internal_is_thin(&pcells) && !parent_is_root {
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

        if let Some(right) = right_sibling {
            let (right_cells, right_tail) = read_internal(pager, right)?;
            if !right_cells.is_empty() {
                let mut shrunk = right_cells;
                let (borrowed_key, borrowed_child) = shrunk.remove(0);
                if !internal_is_thin(&shrunk) {
                    let separator = pcells[pos].0.clone();
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

        if let Some(left) = left_sibling {
            let (left_cells, left_tail) = read_internal(pager, left)?;
            if !left_cells.is_empty() {
                let mut shrunk = left_cells;
                let (new_boundary_key, new_left_tail) = shrunk.pop().unwrap();
                if !internal_is_thin(&shrunk) {
                    let separator = pcells[pos - 1].0.clone();
                    node_cells.insert(0, (separator, left_tail));

                    write_internal(pager, left, &shrunk, new_left_tail)?;
                    write_internal(pager, node, &node_cells, node_tail)?;

                    pcells[pos - 1].0 = new_boundary_key;
                    write_internal(pager, parent, &pcells, tail)?;
                    return Ok(());
                }
            }
        }

        let (keep, drop_page, at) = if let Some(right) = right_sibling {
            (node, right, pos)
        } else if let Some(left) = left_sibling {
            (left, node, pos - 1)
        } else {
            return Ok(());
        };
        let separator = pcells[at].0.clone();

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
        debug!(keep, drop_page, "merged index internal nodes on underflow");

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
            trace!(new_root = tail, "index tree root collapsed");
            return Ok(());
        }

        write_internal(pager, parent, &pcells, tail)?;
        if internal_is_thin(&pcells) && !parent_is_root {
            self.fix_internal_underflow(pager, parent, path)?;
        }
        Ok(())
    }

    /// Ascending `(key, row_id)` pairs with `start <= key` (or every key, if
    /// `start` is `None`), stopping once `end` is exceeded. Used for the
    /// planner's `IndexRange`/`IndexAll` scans; walks leaf-to-leaf via
    /// sibling pointers instead of materializing the whole index.
    pub fn scan_range(
        &self,
        pager: &mut Pager,
        start: Option<&IndexKey>,
        end: Option<&IndexKey>,
        end_inclusive: bool,
    ) -> DbResult<Vec<(IndexKey, u64)>> {
        let mut leaf = match start {
            Some(key) => self.find_leaf(pager, key)?,
            None => self.leftmost_leaf(pager)?,
        };
        let mut out = Vec::new();
        'outer: loop {
            let buf = pager.fetch(leaf)?;
            let (next, cells) = match page::view(buf) {
                PageView::IndexLeaf(mut p) => {
                    let n = p.num_cells();
                    let cells: Vec<(IndexKey, Vec<u64>, PageIdx)> = (0..n)
                        .map(|i| {
                            let c = p.cell(i);
                            (
                                IndexKey::decode(c.key_bytes, &self.key_kinds).0,
                                c.row_ids,
                                c.overflow_page,
                            )
                        })
                        .collect();
                    (p.slotted_next_page(), cells)
                }
                _ => unreachable!(),
            };
            pager.unpin(leaf, false);

            for (key, mut row_ids, overflow_page) in cells {
                if overflow_page != 0 {
                    row_ids.extend(self.read_overflow_row_ids(pager, overflow_page)?);
                }
                if let Some(start) = start {
                    if &key < start {
                        continue;
                    }
                }
                if let Some(end) = end {
                    let past_end = if end_inclusive { &key > end } else { &key >= end };
                    if past_end {
                        break 'outer;
                    }
                }
                for row_id in row_ids {
                    out.push((key.clone(), row_id));
                }
            }

            if next == 0 {
                break;
            }
            leaf = next;
        }
        Ok(out)
    }

    fn leftmost_leaf(&self, pager: &mut Pager) -> DbResult<PageIdx> {
        let mut current = self.root;
        loop {
            let buf = pager.fetch(current)?;
            let next = match page::view(buf) {
                PageView::IndexLeaf(_) => {
                    pager.unpin(current, false);
                    return Ok(current);
                }
                PageView::IndexInternal(mut p) => {
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

    fn find_leaf(&self, pager: &mut Pager, key: &IndexKey) -> DbResult<PageIdx> {
        let mut path = Vec::new();
        self.find_leaf_with_path(pager, key, &mut path)
    }

    fn find_leaf_with_path(
        &self,
        pager: &mut Pager,
        key: &IndexKey,
        path: &mut Vec<PageIdx>,
    ) -> DbResult<PageIdx> {
        let mut current = self.root;
        loop {
            let buf = pager.fetch(current)?;
            let next = match page::view(buf) {
                PageView::IndexLeaf(_) => {
                    pager.unpin(current, false);
                    return Ok(current);
                }
                PageView::IndexInternal(mut p) => {
                    p.child_for(|bytes| self.cmp_encoded(bytes, key))
                }
                _ => unreachable!("index tree only contains leaf/internal pages"),
            };
            pager.unpin(current, false);
            path.push(current);
            current = next;
        }
    }

    fn split_leaf_and_insert(
        &mut self,
        pager: &mut Pager,
        leaf: PageIdx,
        new_key: &[u8],
        new_row_ids: Vec<u64>,
        new_overflow: PageIdx,
    ) -> DbResult<()> {
        let mut path = Vec::new();
        self.find_leaf_with_path(pager, &IndexKey::decode(new_key, &self.key_kinds).0, &mut path)?;
        // drop the leaf itself, keeping only ancestors
        path.pop();

        let buf = pager.fetch(leaf)?;
        let (mut cells, old_next): (Vec<(Vec<u8>, Vec<u64>, PageIdx)>, PageIdx) = match page::view(buf) {
            PageView::IndexLeaf(mut p) => {
                let n = p.num_cells();
                let cells = (0..n)
                    .map(|i| {
                        let c = p.cell(i);
                        (c.key_bytes.to_vec(), c.row_ids, c.overflow_page)
                    })
                    .collect();
                (cells, p.slotted_next_page())
            }
            _ => unreachable!(),
        };

        let insert_at = cells.partition_point(|(k, _, _)| self.cmp_encoded(k, &IndexKey::decode(new_key, &self.key_kinds).0) == Ordering::Less);
        cells.insert(insert_at, (new_key.to_vec(), new_row_ids, new_overflow));

        let mid = cells.len() / 2;
        let right_cells = cells.split_off(mid);

        let (right_idx, right_buf) = pager.new_page(PageKind::IndexLeaf)?;
        match page::view(right_buf) {
            PageView::IndexLeaf(mut p) => {
                let refs: Vec<(&[u8], Vec<u64>, PageIdx)> =
                    right_cells.iter().map(|(k, r, o)| (k.as_slice(), r.clone(), *o)).collect();
                p.rebuild(&refs);
                p.slotted_set_next_page(old_next);
            }
            _ => unreachable!(),
        }
        pager.unpin(right_idx, true);

        let separator = right_cells[0].0.clone();

        let buf = pager.fetch(leaf)?;
        match page::view(buf) {
            PageView::IndexLeaf(mut p) => {
                let refs: Vec<(&[u8], Vec<u64>, PageIdx)> =
                    cells.iter().map(|(k, r, o)| (k.as_slice(), r.clone(), *o)).collect();
                p.rebuild(&refs);
                p.slotted_set_next_page(right_idx);
            }
            _ => unreachable!(),
        }
        pager.unpin(leaf, true);
        debug!(leaf, right_idx, "split index leaf");

        self.insert_into_parent(pager, leaf, &separator, right_idx, &mut path)
    }

    fn insert_into_parent(
        &mut self,
        pager: &mut Pager,
        left_child: PageIdx,
        separator: &[u8],
        right_child: PageIdx,
        path: &mut Vec<PageIdx>,
    ) -> DbResult<()> {
        let Some(parent) = path.pop() else {
            let (new_root, buf) = pager.new_page(PageKind::IndexInternal)?;
            match page::view(buf) {
                PageView::IndexInternal(mut p) => {
                    p.insert(0, separator, left_child);
                    p.set_right_child(right_child);
                }
                _ => unreachable!(),
            }
            pager.unpin(new_root, true);
            self.root = new_root;
            return Ok(());
        };

        let buf = pager.fetch(parent)?;
        let mut cells: Vec<(Vec<u8>, PageIdx)> = match page::view(buf) {
            PageView::IndexInternal(mut p) => {
                let n = p.num_cells();
                (0..n)
                    .map(|i| {
                        let (k, c) = p.cell(i);
                        (k.to_vec(), c)
                    })
                    .collect()
            }
            _ => unreachable!(),
        };
        let mut tail = match page::view(buf) {
            PageView::IndexInternal(mut p) => p.right_child(),
            _ => unreachable!(),
        };

        let insert_at = cells.partition_point(|(k, _)| self.cmp_encoded(k, &IndexKey::decode(separator, &self.key_kinds).0) == Ordering::Less);
        cells.insert(insert_at, (separator.to_vec(), left_child));
        if insert_at + 1 < cells.len() {
            cells[insert_at + 1].1 = right_child;
        } else {
            tail = right_child;
        }

        let needed: usize = cells.iter().map(|(k, _)| 2 + k.len() + 4 + 4).sum();
        let capacity = crate::constants::PAGE_SIZE - PAGE_HEADER_SIZE;

        if needed <= capacity {
            match page::view(buf) {
                PageView::IndexInternal(mut p) => {
                    let refs: Vec<(&[u8], PageIdx)> = cells.iter().map(|(k, c)| (k.as_slice(), *c)).collect();
                    p.rebuild(&refs, tail);
                }
                _ => unreachable!(),
            }
            pager.unpin(parent, true);
            return Ok(());
        }

        let mid = cells.len() / 2;
        let up_separator = cells[mid].0.clone();
        let left_right_child = cells[mid].1;
        let right_cells = cells.split_off(mid + 1);
        let left_cells = cells;

        match page::view(buf) {
            PageView::IndexInternal(mut p) => {
                let refs: Vec<(&[u8], PageIdx)> = left_cells.iter().map(|(k, c)| (k.as_slice(), *c)).collect();
                p.rebuild(&refs, left_right_child);
            }
            _ => unreachable!(),
        }
        pager.unpin(parent, true);

        let (new_right, buf) = pager.new_page(PageKind::IndexInternal)?;
        match page::view(buf) {
            PageView::IndexInternal(mut p) => {
                let refs: Vec<(&[u8], PageIdx)> = right_cells.iter().map(|(k, c)| (k.as_slice(), *c)).collect();
                p.rebuild(&refs, tail);
            }
            _ => unreachable!(),
        }
        pager.unpin(new_right, true);

        self.insert_into_parent(pager, parent, &up_separator, new_right, path)
    }

    fn read_overflow_row_ids(&self, pager: &mut Pager, first: PageIdx) -> DbResult<Vec<u64>> {
        let mut out = Vec::new();
        let mut current = first;
        while current != 0 {
            let buf = pager.fetch(current)?;
            let (next, payload) = match OverflowPage::new(buf) {
                p => (p.next_page(), p.payload().to_vec()),
            };
            pager.unpin(current, false);
            for chunk in payload.chunks_exact(8) {
                out.push(u64::from_le_bytes(chunk.try_into().unwrap()));
            }
            current = next;
        }
        Ok(out)
    }

    fn append_overflow_row_id(
        &self,
        pager: &mut Pager,
        first: PageIdx,
        row_id: u64,
    ) -> DbResult<PageIdx> {
        if first == 0 {
            let (idx, buf) = pager.new_page(PageKind::Overflow)?;
            OverflowPage::new(buf).init(0, &row_id.to_le_bytes());
            pager.unpin(idx, true);
            return Ok(idx);
        }
        // Walk to the last page in the chain and append, allocating a new
        // overflow page once the current tail is full.
        let mut current = first;
        loop {
            let buf = pager.fetch(current)?;
            let (next, len) = {
                let p = OverflowPage::new(buf);
                (p.next_page(), p.data_len())
            };
            if next == 0 && len + 8 <= crate::storage::page::overflow::OVERFLOW_PAYLOAD_CAP {
                let mut payload = OverflowPage::new(buf).payload().to_vec();
                payload.extend_from_slice(&row_id.to_le_bytes());
                OverflowPage::new(buf).init(0, &payload);
                pager.unpin(current, true);
                return Ok(first);
            }
            pager.unpin(current, false);
            if next == 0 {
                let (new_idx, new_buf) = pager.new_page(PageKind::Overflow)?;
                OverflowPage::new(new_buf).init(0, &row_id.to_le_bytes());
                pager.unpin(new_idx, true);
                let buf = pager.fetch(current)?;
                let payload = OverflowPage::new(buf).payload().to_vec();
                OverflowPage::new(buf).init(new_idx, &payload);
                pager.unpin(current, true);
                return Ok(first);
            }
            current = next;
        }
    }
}

enum CellAction {
    New,
    Extend,
}

fn read_leaf(pager: &mut Pager, idx: PageIdx) -> DbResult<Vec<LeafCell>> {
    let buf = pager.fetch(idx)?;
    let cells = match page::view(buf) {
        PageView::IndexLeaf(mut p) => {
            let n = p.num_cells();
            (0..n)
                .map(|i| {
                    let c = p.cell(i);
                    (c.key_bytes.to_vec(), c.row_ids, c.overflow_page)
                })
                .collect()
        }
        _ => unreachable!(),
    };
    pager.unpin(idx, false);
    Ok(cells)
}

fn write_leaf(pager: &mut Pager, idx: PageIdx, cells: &[LeafCell]) -> DbResult<()> {
    let buf = pager.fetch(idx)?;
    match page::view(buf) {
        PageView::IndexLeaf(mut p) => {
            let refs: Vec<(&[u8], Vec<u64>, PageIdx)> =
                cells.iter().map(|(k, r, o)| (k.as_slice(), r.clone(), *o)).collect();
            p.rebuild(&refs);
        }
        _ => unreachable!(),
    }
    pager.unpin(idx, true);
    Ok(())
}

fn read_internal(pager: &mut Pager, idx: PageIdx) -> DbResult<(Vec<InternalCell>, PageIdx)> {
    let buf = pager.fetch(idx)?;
    let result = match page::view(buf) {
        PageView::IndexInternal(mut p) => {
            let n = p.num_cells();
            let cells = (0..n)
                .map(|i| {
                    let (k, c) = p.cell(i);
                    (k.to_vec(), c)
                })
                .collect();
            (cells, p.right_child())
        }
        _ => unreachable!(),
    };
    pager.unpin(idx, false);
    Ok(result)
}

fn write_internal(pager: &mut Pager, idx: PageIdx, cells: &[InternalCell], tail: PageIdx) -> DbResult<()> {
    let buf = pager.fetch(idx)?;
    match page::view(buf) {
        PageView::IndexInternal(mut p) => {
            let refs: Vec<(&[u8], PageIdx)> = cells.iter().map(|(k, c)| (k.as_slice(), *c)).collect();
            p.rebuild(&refs, tail);
        }
        _ => unreachable!(),
    }
    pager.unpin(idx, true);
    Ok(())
}
