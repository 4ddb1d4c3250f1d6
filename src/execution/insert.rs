//! `INSERT` execution (spec §4.9: "INSERT allocates a RowID ... then inserts
//! into every index, skipping NULL keys").
//!
//! Grounded on nimbus's `InsertExecutor`: pull rows from a child executor,
//! write each into the catalog's table, and return the affected-row count as
//! a single synthetic row. nimbus only ever appends to the heap and never
//! touches an index from `InsertExecutor` itself; this generalizes that into
//! RowID allocation through the catalog (rather than nimbus's own OID
//! counter) plus per-row maintenance of every index on the table.

use crate::catalog::manager::{index_key_for, Catalog};
use crate::catalog::schema::TableDescriptor;
use crate::error::{DbError, DbResult};
use crate::storage::overflow_io;
use crate::storage::pager::Pager;
use crate::value::{Row, TextPointer, Value};

use super::executor::{ExecRow, Executor};

pub struct InsertExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    catalog: &'a mut Catalog,
    table_name: String,
    table: TableDescriptor,
    columns: Vec<String>,
    executed: bool,
}

impl<'a> InsertExecutor<'a> {
    pub fn new(
        child: Box<dyn Executor + 'a>,
        catalog: &'a mut Catalog,
        table_name: String,
        columns: Option<Vec<String>>,
    ) -> DbResult<Self> {
        let table = catalog
            .get_table(&table_name)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(table_name.clone()))?;
        let columns = columns.unwrap_or_else(|| table.columns.iter().map(|c| c.name.clone()).collect());
        Ok(Self { child, catalog, table_name, table, columns, executed: false })
    }

    fn insert_one(&mut self, pager: &mut Pager, partial: Row) -> DbResult<()> {
        let mut values: Vec<Option<Value>> = vec![None; self.table.columns.len()];
        for (col_name, value) in self.columns.iter().zip(partial.values.into_iter()) {
            let idx = self.table.column_index(col_name).ok_or_else(|| {
                DbError::Validate(format!("no column {col_name} on table {}", self.table_name))
            })?;
            values[idx] = match value {
                Some(v) => Some(v.coerce(self.table.columns[idx].kind)?),
                None => None,
            };
        }
        for (idx, col) in self.table.columns.iter().enumerate() {
            if values[idx].is_none() && !col.nullable {
                return Err(DbError::ConstraintNull(col.name.clone()));
            }
        }

        let row_id = match self.table.rowid_alias_column() {
            Some(idx) => match &values[idx] {
                Some(Value::Int4(v)) => {
                    let id = *v as u64;
                    self.catalog.observe_row_id(&self.table_name, id);
                    id
                }
                Some(Value::Int8(v)) => {
                    let id = *v as u64;
                    self.catalog.observe_row_id(&self.table_name, id);
                    id
                }
                _ => self.catalog.alloc_row_id(pager, &self.table_name)?,
            },
            None => self.catalog.alloc_row_id(pager, &self.table_name)?,
        };

        let row = Row::new(values);
        let bytes = row.encode(&self.table.column_kinds(), |s| {
            let first_overflow_page = overflow_io::write_chain(pager, s.as_bytes())?;
            Ok(TextPointer { first_overflow_page, total_length: s.len() as u32 })
        })?;

        let mut table_tree = self
            .catalog
            .open_table_tree(&self.table_name)
            .ok_or_else(|| DbError::TableNotFound(self.table_name.clone()))?;
        table_tree.insert(pager, row_id, &bytes)?;

        for index_name in self.catalog.indexes_for_table(&self.table_name).to_vec() {
            let desc = self.catalog.get_index(&index_name).cloned().expect("catalog is self-consistent");
            if let Some(key) = index_key_for(&row, &self.table, &desc.columns) {
                let mut tree = self.catalog.open_index_tree(&index_name).expect("catalog is self-consistent");
                tree.insert(pager, &key, row_id)?;
            }
        }
        Ok(())
    }
}

impl<'a> Executor for InsertExecutor<'a> {
    fn init(&mut self, pager: &mut Pager) -> DbResult<()> {
        self.executed = false;
        self.child.init(pager)
    }

    fn next(&mut self, pager: &mut Pager) -> DbResult<Option<ExecRow>> {
        if self.executed {
            return Ok(None);
        }
        let mut count: i64 = 0;
        while let Some(exec_row) = self.child.next(pager)? {
            self.insert_one(pager, exec_row.row)?;
            count += 1;
        }
        self.executed = true;
        Ok(Some(ExecRow { row_id: None, row: Row::new(vec![Some(Value::Int8(count))]) }))
    }
}
