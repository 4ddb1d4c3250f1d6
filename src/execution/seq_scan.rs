//! Sequential table scan (spec §4.9).
//!
//! Grounded on nimbus's `SeqScanExecutor`: looks up the table's root page at
//! `init` and walks the heap leaf-to-leaf. nimbus keeps a live `HeapIterator`
//! borrowing the buffer pool across `next` calls; `TableTree` has no cursor
//! of its own (`scan` returns every row up front), so this wraps that `Vec`
//! in a cursor instead.

use super::executor::{ExecRow, Executor};
use crate::catalog::schema::TableDescriptor;
use crate::error::{DbError, DbResult};
use crate::storage::overflow_io;
use crate::storage::pager::Pager;
use crate::storage::table_tree::TableTree;
use crate::value::Row;

pub struct SeqScanExecutor {
    tree: TableTree,
    table: TableDescriptor,
    rows: Vec<(u64, Vec<u8>)>,
    cursor: usize,
}

impl SeqScanExecutor {
    pub fn new(tree: TableTree, table: TableDescriptor) -> Self {
        Self { tree, table, rows: Vec::new(), cursor: 0 }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self, pager: &mut Pager) -> DbResult<()> {
        self.rows = self.tree.scan(pager)?;
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self, pager: &mut Pager) -> DbResult<Option<ExecRow>> {
        let Some((row_id, bytes)) = self.rows.get(self.cursor) else {
            return Ok(None);
        };
        let row = Row::decode(bytes, &self.table.column_kinds(), |ptr| {
            let bytes = overflow_io::read_chain(pager, ptr.first_overflow_page, ptr.total_length as usize)?;
            String::from_utf8(bytes)
                .map_err(|_| DbError::CorruptPage { page: 0, reason: "non-utf8 overflow text".into() })
        })?;
        let row_id = *row_id;
        self.cursor += 1;
        Ok(Some(ExecRow { row_id: Some(row_id), row }))
    }
}
