//! `UPDATE` execution (spec §4.9).
//!
//! Grounded on nimbus's `UpdateExecutor<F: Fn(&Tuple) -> Tuple>`: drain a
//! child executor and, for each matched row, rewrite it. nimbus always
//! rewrote its single fixed-width heap slot in place; this tree's leaf cells
//! are variable-length, so a row whose new encoding no longer fits where it
//! sat, or whose new value moves it out from under an index, has to be
//! deleted and reinserted instead (spec §4.9's in-place/relocating split).
//! Every matched row is still drained up front (this tree's cursors don't
//! survive a page split mid-scan), but each row's own in-place/relocating
//! choice is independent of the others'. The RowID itself never changes
//! across an UPDATE, only the cell that stores the row and the indexes keyed
//! off its old and new values.

use crate::catalog::manager::{index_key_for, Catalog};
use crate::catalog::schema::TableDescriptor;
use crate::error::{DbError, DbResult};
use crate::statement::{Assignment, Expr};
use crate::storage::overflow_io;
use crate::storage::pager::Pager;
use crate::value::{Row, TextPointer, Value};

use super::executor::{ExecRow, Executor};

pub struct UpdateExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    catalog: &'a mut Catalog,
    table_name: String,
    table: TableDescriptor,
    assignments: Vec<Assignment>,
    executed: bool,
}

impl<'a> UpdateExecutor<'a> {
    pub fn new(
        child: Box<dyn Executor + 'a>,
        catalog: &'a mut Catalog,
        table_name: String,
        assignments: Vec<Assignment>,
    ) -> DbResult<Self> {
        let table = catalog
            .get_table(&table_name)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(table_name.clone()))?;
        Ok(Self { child, catalog, table_name, table, assignments, executed: false })
    }

    fn update_one(&mut self, pager: &mut Pager, row_id: u64, old_row: Row) -> DbResult<()> {
        let mut new_values = old_row.values.clone();
        for assignment in &self.assignments {
            let idx = self.table.column_index(&assignment.column).ok_or_else(|| {
                DbError::Validate(format!("no column {} on table {}", assignment.column, self.table_name))
            })?;
            new_values[idx] = match &assignment.value {
                Expr::Literal(v) => Some(v.clone().coerce(self.table.columns[idx].kind)?),
                Expr::Null => None,
                _ => return Err(DbError::Validate("SET value must bind to a literal".into())),
            };
        }
        for (idx, col) in self.table.columns.iter().enumerate() {
            if new_values[idx].is_none() && !col.nullable {
                return Err(DbError::ConstraintNull(col.name.clone()));
            }
        }
        let new_row = Row::new(new_values);

        let index_names = self.catalog.indexes_for_table(&self.table_name).to_vec();
        let mut key_changes = Vec::with_capacity(index_names.len());
        let mut relocate = false;
        for index_name in &index_names {
            let desc = self.catalog.get_index(index_name).cloned().expect("catalog is self-consistent");
            let old_key = index_key_for(&old_row, &self.table, &desc.columns);
            let new_key = index_key_for(&new_row, &self.table, &desc.columns);
            if old_key != new_key {
                relocate = true;
            }
            key_changes.push((index_name.clone(), old_key, new_key));
        }

        let kinds = self.table.column_kinds();
        let bytes = new_row.encode(&kinds, |s| {
            let first_overflow_page = overflow_io::write_chain(pager, s.as_bytes())?;
            Ok(TextPointer { first_overflow_page, total_length: s.len() as u32 })
        })?;

        let mut table_tree = self
            .catalog
            .open_table_tree(&self.table_name)
            .ok_or_else(|| DbError::TableNotFound(self.table_name.clone()))?;
        let old_bytes = table_tree.seek(pager, row_id)?.ok_or_else(|| DbError::CorruptPage {
            page: table_tree.root,
            reason: format!("updated row {row_id} vanished from its own table tree"),
        })?;
        if bytes.len() > old_bytes.len() {
            relocate = true;
        }

        // The new encoding above already wrote a fresh overflow chain for
        // every Text/overflowed-Varchar column, in place or not, so the
        // pre-image's chains are always orphaned from here on.
        for ptr in Row::overflow_pointers(&old_bytes, &kinds)? {
            overflow_io::free_chain(pager, ptr.first_overflow_page)?;
        }

        if relocate {
            for (index_name, old_key, _) in &key_changes {
                if let Some(old_key) = old_key {
                    let mut tree = self.catalog.open_index_tree(index_name).expect("catalog is self-consistent");
                    tree.delete(pager, old_key, row_id)?;
                }
            }
            table_tree.delete(pager, row_id)?;
            table_tree.insert(pager, row_id, &bytes)?;
            for (index_name, _, new_key) in &key_changes {
                if let Some(new_key) = new_key {
                    let mut tree = self.catalog.open_index_tree(index_name).expect("catalog is self-consistent");
                    tree.insert(pager, new_key, row_id)?;
                }
            }
        } else {
            table_tree.update_in_place(pager, row_id, &bytes)?;
        }
        Ok(())
    }
}

impl<'a> Executor for UpdateExecutor<'a> {
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
            self.update_one(pager, row_id, exec_row.row)?;
            count += 1;
        }
        self.executed = true;
        Ok(Some(ExecRow { row_id: None, row: Row::new(vec![Some(Value::Int8(count))]) }))
    }
}
