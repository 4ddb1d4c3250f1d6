//! Literal `VALUES` rows feeding an `INSERT` (spec §4.9).
//!
//! Grounded on nimbus's `ValuesExecutor`: a static list of tuples with a
//! cursor, no child of its own. The expressions it wraps are already bound
//! and `NOW()`-substituted by the time a statement reaches the executor
//! layer, so only `Literal`/`Null` ever appear here.

use crate::error::{DbError, DbResult};
use crate::statement::Expr;
use crate::storage::pager::Pager;
use crate::value::{Row, Value};

use super::executor::{ExecRow, Executor};

pub struct ValuesExecutor {
    rows: Vec<Vec<Expr>>,
    cursor: usize,
}

impl ValuesExecutor {
    pub fn new(rows: Vec<Vec<Expr>>) -> Self {
        Self { rows, cursor: 0 }
    }
}

impl Executor for ValuesExecutor {
    fn init(&mut self, _pager: &mut Pager) -> DbResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self, _pager: &mut Pager) -> DbResult<Option<ExecRow>> {
        let Some(exprs) = self.rows.get(self.cursor) else {
            return Ok(None);
        };
        let values = exprs.iter().map(expr_to_value).collect::<DbResult<Vec<_>>>()?;
        self.cursor += 1;
        Ok(Some(ExecRow { row_id: None, row: Row::new(values) }))
    }
}

fn expr_to_value(expr: &Expr) -> DbResult<Option<Value>> {
    match expr {
        Expr::Literal(v) => Ok(Some(v.clone())),
        Expr::Null => Ok(None),
        _ => Err(DbError::Validate("INSERT values must be literals after binding".into())),
    }
}
