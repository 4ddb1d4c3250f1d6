//! Post-scan predicate evaluation (spec §4.9, "leftover" conjuncts the scan
//! itself doesn't already narrow by).
//!
//! Grounded on nimbus's `FilterExecutor<P: Fn(&Tuple) -> bool>`: pull from a
//! child until a predicate matches. nimbus's predicate is an opaque Rust
//! closure built by the caller; this crate's planner hands back `Expr` trees
//! instead (composite WHERE clauses, possibly with OR/NOT the planner
//! couldn't push into the scan), so the predicate here is a small recursive
//! evaluator over that tree rather than a closure.

use std::cmp::Ordering;

use crate::catalog::schema::TableDescriptor;
use crate::error::DbResult;
use crate::statement::{BinOp, Expr};
use crate::storage::pager::Pager;
use crate::value::Value;

use super::executor::{ExecRow, Executor};

pub struct FilterExecutor {
    child: Box<dyn Executor>,
    filters: Vec<Expr>,
    table: TableDescriptor,
}

impl FilterExecutor {
    pub fn new(child: Box<dyn Executor>, filters: Vec<Expr>, table: TableDescriptor) -> Self {
        Self { child, filters, table }
    }
}

impl Executor for FilterExecutor {
    fn init(&mut self, pager: &mut Pager) -> DbResult<()> {
        self.child.init(pager)
    }

    fn next(&mut self, pager: &mut Pager) -> DbResult<Option<ExecRow>> {
        while let Some(exec_row) = self.child.next(pager)? {
            if self.filters.iter().all(|f| eval_bool(f, &exec_row.row, &self.table)) {
                return Ok(Some(exec_row));
            }
        }
        Ok(None)
    }
}

fn eval_bool(expr: &Expr, row: &crate::value::Row, table: &TableDescriptor) -> bool {
    match expr {
        Expr::BinaryOp(l, BinOp::And, r) => eval_bool(l, row, table) && eval_bool(r, row, table),
        Expr::BinaryOp(l, BinOp::Or, r) => eval_bool(l, row, table) || eval_bool(r, row, table),
        Expr::BinaryOp(l, op, r) => match (eval_value(l, row, table), eval_value(r, row, table)) {
            (Some(lv), Some(rv)) => compare(&lv, *op, &rv),
            // NULL compares false against anything, same as SQL three-valued
            // logic collapsed to a binary result.
            _ => false,
        },
        Expr::Not(e) => !eval_bool(e, row, table),
        Expr::IsNull(e) => eval_value(e, row, table).is_none(),
        Expr::IsNotNull(e) => eval_value(e, row, table).is_some(),
        Expr::Column(_) | Expr::Literal(_) | Expr::Null | Expr::Now | Expr::Placeholder(_) => {
            matches!(eval_value(expr, row, table), Some(Value::Boolean(true)))
        }
    }
}

fn eval_value(expr: &Expr, row: &crate::value::Row, table: &TableDescriptor) -> Option<Value> {
    match expr {
        Expr::Column(name) => {
            let idx = table.column_index(name)?;
            row.values[idx].clone()
        }
        Expr::Literal(v) => Some(v.clone()),
        _ => None,
    }
}

fn compare(l: &Value, op: BinOp, r: &Value) -> bool {
    match op {
        BinOp::Eq => values_eq(l, r),
        BinOp::NotEq => !values_eq(l, r),
        BinOp::Lt => values_cmp(l, r) == Some(Ordering::Less),
        BinOp::LtEq => matches!(values_cmp(l, r), Some(Ordering::Less) | Some(Ordering::Equal)),
        BinOp::Gt => values_cmp(l, r) == Some(Ordering::Greater),
        BinOp::GtEq => matches!(values_cmp(l, r), Some(Ordering::Greater) | Some(Ordering::Equal)),
        BinOp::And | BinOp::Or => unreachable!("And/Or are handled by eval_bool directly"),
    }
}

fn values_eq(l: &Value, r: &Value) -> bool {
    values_cmp(l, r) == Some(Ordering::Equal)
}

/// Compares two values that may not share a `ColumnKind` (every SQL integer
/// literal parses as `Int8`, every float as `Double`, so a filter against a
/// narrower column is common). Falls back to a numeric comparison whenever
/// both sides have one.
pub(super) fn values_cmp(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Varchar(a), Value::Varchar(b))
        | (Value::Varchar(a), Value::Text(b))
        | (Value::Text(a), Value::Varchar(b))
        | (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        _ => as_f64(l).zip(as_f64(r)).and_then(|(a, b)| a.partial_cmp(&b)),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int4(v) => Some(*v as f64),
        Value::Int8(v) => Some(*v as f64),
        Value::Real(v) => Some(*v as f64),
        Value::Double(v) => Some(*v),
        Value::Timestamp(v) => Some(*v as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::ColumnDescriptor;
    use crate::value::{ColumnKind, Row};

    fn table() -> TableDescriptor {
        TableDescriptor {
            name: "t".into(),
            columns: vec![ColumnDescriptor {
                name: "age".into(),
                kind: ColumnKind::Int4,
                nullable: true,
                primary_key: false,
                unique: false,
            }],
            root_page: 1,
        }
    }

    #[test]
    fn compares_int8_literal_against_int4_column() {
        let table = table();
        let row = Row::new(vec![Some(Value::Int4(42))]);
        let expr = Expr::BinaryOp(
            Box::new(Expr::Column("age".into())),
            BinOp::Gt,
            Box::new(Expr::Literal(Value::Int8(10))),
        );
        assert!(eval_bool(&expr, &row, &table));
    }

    #[test]
    fn null_column_never_matches_comparison() {
        let table = table();
        let row = Row::new(vec![None]);
        let expr = Expr::BinaryOp(
            Box::new(Expr::Column("age".into())),
            BinOp::Eq,
            Box::new(Expr::Literal(Value::Int8(10))),
        );
        assert!(!eval_bool(&expr, &row, &table));
    }

    #[test]
    fn is_null_matches_missing_value() {
        let table = table();
        let row = Row::new(vec![None]);
        let expr = Expr::IsNull(Box::new(Expr::Column("age".into())));
        assert!(eval_bool(&expr, &row, &table));
    }
}
