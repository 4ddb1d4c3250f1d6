//! Index-backed scan: point lookup, range scan or full index order (spec
//! §4.9, §4.8).
//!
//! Grounded on nimbus's `IndexScanExecutor`: look the key up in the B-tree,
//! then fetch the matching row out of the heap by RowID. nimbus only ever
//! does a single-shot unique point lookup; this generalizes to the
//! planner's three index-backed `ScanKind`s, all resolved to an ordered list
//! of RowIDs up front and then fetched one at a time.

use crate::catalog::schema::TableDescriptor;
use crate::error::{DbError, DbResult};
use crate::key::IndexKey;
use crate::planner::{RangeCondition, ScanKind};
use crate::storage::index_tree::IndexTree;
use crate::storage::overflow_io;
use crate::storage::pager::Pager;
use crate::storage::table_tree::TableTree;
use crate::value::Row;

use super::executor::{ExecRow, Executor};

pub struct IndexScanExecutor {
    index: IndexTree,
    table_tree: TableTree,
    table: TableDescriptor,
    kind: ScanKind,
    key: Option<IndexKey>,
    range: Option<RangeCondition>,
    reverse: bool,
    row_ids: Vec<u64>,
    cursor: usize,
}

impl IndexScanExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: IndexTree,
        table_tree: TableTree,
        table: TableDescriptor,
        kind: ScanKind,
        key: Option<IndexKey>,
        range: Option<RangeCondition>,
        reverse: bool,
    ) -> Self {
        Self { index, table_tree, table, kind, key, range, reverse, row_ids: Vec::new(), cursor: 0 }
    }
}

impl Executor for IndexScanExecutor {
    fn init(&mut self, pager: &mut Pager) -> DbResult<()> {
        let mut row_ids = match self.kind {
            ScanKind::IndexPoint => {
                let key = self.key.as_ref().expect("IndexPoint scan always carries a key");
                self.index.seek(pager, key)?
            }
            ScanKind::IndexRange => {
                let range = self.range.as_ref().expect("IndexRange scan always carries a range");
                let pairs = self.index.scan_range(pager, range.start.as_ref(), range.end.as_ref(), range.end_inclusive)?;
                pairs
                    .into_iter()
                    .filter(|(key, _)| match (&range.start, range.start_inclusive) {
                        (Some(start), false) => key != start,
                        _ => true,
                    })
                    .map(|(_, row_id)| row_id)
                    .collect()
            }
            ScanKind::IndexAll => {
                self.index.scan_range(pager, None, None, true)?.into_iter().map(|(_, row_id)| row_id).collect()
            }
            ScanKind::Sequential => unreachable!("IndexScanExecutor is only built for index-backed scans"),
        };
        if self.reverse {
            row_ids.reverse();
        }
        self.row_ids = row_ids;
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self, pager: &mut Pager) -> DbResult<Option<ExecRow>> {
        let Some(row_id) = self.row_ids.get(self.cursor).copied() else {
            return Ok(None);
        };
        self.cursor += 1;
        let bytes = self.table_tree.seek(pager, row_id)?.ok_or_else(|| DbError::CorruptPage {
            page: self.table_tree.root,
            reason: format!("index {} references missing row {row_id}", self.index.name),
        })?;
        let row = Row::decode(&bytes, &self.table.column_kinds(), |ptr| {
            let bytes = overflow_io::read_chain(pager, ptr.first_overflow_page, ptr.total_length as usize)?;
            String::from_utf8(bytes)
                .map_err(|_| DbError::CorruptPage { page: 0, reason: "non-utf8 overflow text".into() })
        })?;
        Ok(Some(ExecRow { row_id: Some(row_id), row }))
    }
}
