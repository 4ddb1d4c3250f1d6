//! Column projection, including `COUNT(*)` (spec §4.9).
//!
//! Grounded on nimbus's `ProjectionExecutor`: rebuild each row from a list of
//! selected columns. `COUNT(*)` has no nimbus counterpart; it drains the
//! child entirely on the first `next` call and emits one synthetic row, the
//! same single-row-result shape nimbus's `InsertExecutor` uses for its
//! affected-row count.

use crate::catalog::schema::TableDescriptor;
use crate::error::DbResult;
use crate::statement::Projection;
use crate::storage::pager::Pager;
use crate::value::{Row, Value};

use super::executor::{ExecRow, Executor};

pub struct ProjectionExecutor {
    child: Box<dyn Executor>,
    projection: Projection,
    table: TableDescriptor,
    count_done: bool,
}

impl ProjectionExecutor {
    pub fn new(child: Box<dyn Executor>, projection: Projection, table: TableDescriptor) -> Self {
        Self { child, projection, table, count_done: false }
    }
}

impl Executor for ProjectionExecutor {
    fn init(&mut self, pager: &mut Pager) -> DbResult<()> {
        self.count_done = false;
        self.child.init(pager)
    }

    fn next(&mut self, pager: &mut Pager) -> DbResult<Option<ExecRow>> {
        match &self.projection {
            Projection::CountStar => {
                if self.count_done {
                    return Ok(None);
                }
                let mut count: i64 = 0;
                while self.child.next(pager)?.is_some() {
                    count += 1;
                }
                self.count_done = true;
                Ok(Some(ExecRow { row_id: None, row: Row::new(vec![Some(Value::Int8(count))]) }))
            }
            Projection::All => self.child.next(pager),
            Projection::Columns(cols) => {
                let Some(exec_row) = self.child.next(pager)? else { return Ok(None) };
                let values = cols
                    .iter()
                    .map(|c| {
                        let idx = self.table.column_index(c).expect("projection columns are validated up front");
                        exec_row.row.values[idx].clone()
                    })
                    .collect();
                Ok(Some(ExecRow { row_id: exec_row.row_id, row: Row::new(values) }))
            }
        }
    }
}
