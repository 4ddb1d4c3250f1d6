//! `LIMIT`/`OFFSET` (spec §4.9).
//!
//! nimbus has no pagination stage; this is a thin new executor in the same
//! pull shape, skipping `offset` rows from the child before counting `limit`
//! rows out.

use crate::error::DbResult;
use crate::storage::pager::Pager;

use super::executor::{ExecRow, Executor};

pub struct LimitExecutor {
    child: Box<dyn Executor>,
    limit: Option<i64>,
    offset: i64,
    skipped: i64,
    emitted: i64,
}

impl LimitExecutor {
    pub fn new(child: Box<dyn Executor>, limit: Option<i64>, offset: Option<i64>) -> Self {
        Self { child, limit, offset: offset.unwrap_or(0), skipped: 0, emitted: 0 }
    }
}

impl Executor for LimitExecutor {
    fn init(&mut self, pager: &mut Pager) -> DbResult<()> {
        self.skipped = 0;
        self.emitted = 0;
        self.child.init(pager)
    }

    fn next(&mut self, pager: &mut Pager) -> DbResult<Option<ExecRow>> {
        if let Some(limit) = self.limit {
            if self.emitted >= limit {
                return Ok(None);
            }
        }
        while self.skipped < self.offset {
            if self.child.next(pager)?.is_none() {
                return Ok(None);
            }
            self.skipped += 1;
        }
        let row = self.child.next(pager)?;
        if row.is_some() {
            self.emitted += 1;
        }
        Ok(row)
    }
}
