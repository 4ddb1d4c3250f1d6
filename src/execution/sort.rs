//! In-memory `ORDER BY` (spec §4.9; only reached when the planner sets
//! `QueryPlan::sort_in_memory`).
//!
//! nimbus has no `ORDER BY` at all. This materializes the child's rows once
//! at `init` and sorts them by the requested columns, ties broken by RowID
//! ascending so repeated runs over an unchanged table are stable (spec §8).

use std::cmp::Ordering;

use crate::catalog::schema::TableDescriptor;
use crate::error::DbResult;
use crate::statement::OrderByItem;
use crate::storage::pager::Pager;
use crate::value::Value;

use super::executor::{ExecRow, Executor};
use super::filter::values_cmp;

pub struct SortExecutor {
    child: Box<dyn Executor>,
    order_by: Vec<OrderByItem>,
    table: TableDescriptor,
    rows: Vec<ExecRow>,
    cursor: usize,
}

impl SortExecutor {
    pub fn new(child: Box<dyn Executor>, order_by: Vec<OrderByItem>, table: TableDescriptor) -> Self {
        Self { child, order_by, table, rows: Vec::new(), cursor: 0 }
    }
}

impl Executor for SortExecutor {
    fn init(&mut self, pager: &mut Pager) -> DbResult<()> {
        self.child.init(pager)?;
        self.rows.clear();
        while let Some(row) = self.child.next(pager)? {
            self.rows.push(row);
        }
        let order_by = &self.order_by;
        let table = &self.table;
        self.rows.sort_by(|a, b| compare_rows(a, b, order_by, table));
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self, _pager: &mut Pager) -> DbResult<Option<ExecRow>> {
        let row = self.rows.get(self.cursor).cloned();
        if row.is_some() {
            self.cursor += 1;
        }
        Ok(row)
    }
}

fn compare_rows(a: &ExecRow, b: &ExecRow, order_by: &[OrderByItem], table: &TableDescriptor) -> Ordering {
    for item in order_by {
        let Some(idx) = table.column_index(&item.column) else { continue };
        let ord = compare_values(a.row.values[idx].as_ref(), b.row.values[idx].as_ref());
        let ord = if item.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.row_id.cmp(&b.row_id)
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => values_cmp(a, b).unwrap_or(Ordering::Equal),
    }
}
