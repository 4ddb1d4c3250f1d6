//! `DELETE` execution (spec §4.9: "DELETE removes from the table B-tree,
//! then from every index, computing the pre-image key from the fetched
//! row").
//!
//! Grounded on nimbus's `DeleteExecutor`: drain a child executor and delete
//! each matched row by RowID. nimbus never had secondary indexes to clean up
//! alongside the heap; this adds that index maintenance, keyed off the
//! deleted row's own values rather than a separately stored key. It also
//! frees the deleted row's overflow chains, read off its pre-image bytes
//! before the row leaves the table tree, so a later INSERT reuses the pages
//! instead of growing the file.

use crate::catalog::manager::{index_key_for, Catalog};
use crate::catalog::schema::TableDescriptor;
use crate::error::{DbError, DbResult};
use crate::storage::overflow_io;
use crate::storage::pager::Pager;
use crate::value::{Row, Value};

use super::executor::{ExecRow, Executor};

pub struct DeleteExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    catalog: &'a mut Catalog,
    table_name: String,
    table: TableDescriptor,
    executed: bool,
}

impl<'a> DeleteExecutor<'a> {
    pub fn new(child: Box<dyn Executor + 'a>, catalog: &'a mut Catalog, table_name: String) -> DbResult<Self> {
        let table = catalog
            .get_table(&table_name)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(table_name.clone()))?;
        Ok(Self { child, catalog, table_name, table, executed: false })
    }

    fn delete_one(&mut self, pager: &mut Pager, row_id: u64, row: Row) -> DbResult<()> {
        for index_name in self.catalog.indexes_for_table(&self.table_name).to_vec() {
            let desc = self.catalog.get_index(&index_name).cloned().expect("catalog is self-consistent");
            if let Some(key) = index_key_for(&row, &self.table, &desc.columns) {
                let mut tree = self.catalog.open_index_tree(&index_name).expect("catalog is self-consistent");
                tree.delete(pager, &key, row_id)?;
            }
        }
        let mut table_tree = self
            .catalog
            .open_table_tree(&self.table_name)
            .ok_or_else(|| DbError::TableNotFound(self.table_name.clone()))?;
        let old_bytes = table_tree.seek(pager, row_id)?;
        table_tree.delete(pager, row_id)?;
        if let Some(old_bytes) = old_bytes {
            for ptr in Row::overflow_pointers(&old_bytes, &self.table.column_kinds())? {
                overflow_io::free_chain(pager, ptr.first_overflow_page)?;
            }
        }
        Ok(())
    }
}

impl<'a> Executor for DeleteExecutor<'a> {
    fn init(&mut self, pager: &mut Pager) -> DbResult<()> {
        self.executed = false;
        self.child.init(pager)
    }

    fn next(&mut self, pager: &mut Pager) -> DbResult<Option<ExecRow>> {
        if self.executed {
            return Ok(None);
        }
        let mut matched = Vec::new();
        while let Some(exec_row) = self.child.next(pager)? {
            matched.push(exec_row);
        }

        let mut count: i64 = 0;
        for exec_row in matched {
            let row_id = exec_row.row_id.expect("scans always carry a RowID");
            self.delete_one(pager, row_id, exec_row.row)?;
            count += 1;
        }
        self.executed = true;
        Ok(Some(ExecRow { row_id: None, row: Row::new(vec![Some(Value::Int8(count))]) }))
    }
}
