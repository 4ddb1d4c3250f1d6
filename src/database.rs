//! The embedded-database façade (spec §5): opens one file, owns the pager,
//! transaction manager and catalog, and runs one statement at a time.
//!
//! Grounded on nimbus's `main.rs` dispatch: `CREATE TABLE`/`CREATE INDEX`
//! run straight against the catalog, everything else goes through the
//! planner and an executor pipeline built over the buffer pool. This wraps
//! that dispatch behind a reusable `Database` type and, unlike nimbus's
//! unconditional single-writer commit, runs every mutating statement inside
//! the spec's optimistic transaction (`TransactionManager::begin`/`commit`/
//! `abort`) so a failed statement never leaves a partial write behind.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::instrument;

use crate::catalog::manager::Catalog;
use crate::error::{DbError, DbResult};
use crate::execution::analyze::AnalyzeExecutor;
use crate::execution::delete::DeleteExecutor;
use crate::execution::insert::InsertExecutor;
use crate::execution::limit::LimitExecutor;
use crate::execution::projection::ProjectionExecutor;
use crate::execution::sort::SortExecutor;
use crate::execution::update::UpdateExecutor;
use crate::execution::values::ValuesExecutor;
use crate::execution::{build_scan, Executor};
use crate::planner::Planner;
use crate::statement::{Projection, Statement};
use crate::storage::pager::Pager;
use crate::storage::transaction::TransactionManager;
use crate::value::Value;

/// The outcome of one [`Database::execute`] call: the projected column
/// names (empty for DDL and DML) and every returned row's values.
#[derive(Debug, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<Value>>>,
}

impl QueryResult {
    fn empty() -> Self {
        Self::default()
    }

    fn affected(count: i64) -> Self {
        Self { columns: vec!["affected".to_string()], rows: vec![vec![Some(Value::Int8(count))]] }
    }
}

pub struct Database {
    pager: Pager,
    catalog: Catalog,
    tx_manager: TransactionManager,
}

impl Database {
    pub fn open(path: &str) -> DbResult<Self> {
        let mut pager = Pager::open(path)?;
        let catalog = Catalog::open(&mut pager)?;
        let tx_manager = TransactionManager::new(path);
        Ok(Self { pager, catalog, tx_manager })
    }

    pub fn close(mut self) -> DbResult<()> {
        self.pager.flush_all()
    }

    /// Parses, binds, validates and runs one SQL statement (spec §4.9).
    /// `params` fill any `?` placeholders the statement carries.
    #[instrument(skip(self, sql, params))]
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<QueryResult> {
        let now = now_millis();
        let stmt = crate::parser::parse(sql)?.bind(params)?.substitute_now(now);
        stmt.validate(&self.catalog)?;

        match &stmt {
            Statement::Select { .. } => self.execute_select(&stmt),
            _ => self.run_in_transaction(|db| db.execute_mutation(&stmt)),
        }
    }

    /// Recomputes every index's `(n_entry, n_distinct)` statistics for
    /// `table` (spec §4.9, `ANALYZE`). Touches no page a transaction would
    /// need to roll back: the stats themselves live only in the catalog's
    /// in-memory cache.
    pub fn analyze(&mut self, table: &str) -> DbResult<()> {
        if self.catalog.get_table(table).is_none() {
            return Err(DbError::TableNotFound(table.to_string()));
        }
        let mut exec = AnalyzeExecutor::new(&mut self.catalog, table.to_string());
        exec.init(&mut self.pager)?;
        exec.next(&mut self.pager)?;
        Ok(())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog.table_names()
    }

    fn run_in_transaction(&mut self, f: impl FnOnce(&mut Self) -> DbResult<QueryResult>) -> DbResult<QueryResult> {
        let tx = self.tx_manager.begin(&mut self.pager);
        match f(self) {
            Ok(result) => {
                self.tx_manager.commit(tx, &mut self.pager)?;
                Ok(result)
            }
            Err(e) => {
                self.tx_manager.abort(&mut self.pager);
                Err(e)
            }
        }
    }

    fn execute_mutation(&mut self, stmt: &Statement) -> DbResult<QueryResult> {
        match stmt {
            Statement::CreateTable { name, columns } => {
                self.catalog.create_table(&mut self.pager, name, columns.clone())?;
                Ok(QueryResult::empty())
            }
            Statement::DropTable { name, if_exists } => {
                match self.catalog.drop_table(&mut self.pager, name) {
                    Ok(()) => Ok(QueryResult::empty()),
                    Err(DbError::TableNotFound(_)) if *if_exists => Ok(QueryResult::empty()),
                    Err(e) => Err(e),
                }
            }
            Statement::CreateIndex { name, table, columns, unique } => {
                self.catalog.create_index(&mut self.pager, name, table, columns.clone(), *unique)?;
                Ok(QueryResult::empty())
            }
            Statement::DropIndex { name, if_exists } => {
                match self.catalog.drop_index(&mut self.pager, name) {
                    Ok(()) => Ok(QueryResult::empty()),
                    Err(DbError::IndexNotFound(_)) if *if_exists => Ok(QueryResult::empty()),
                    Err(e) => Err(e),
                }
            }
            Statement::Insert { table, columns, rows } => {
                let values = Box::new(ValuesExecutor::new(rows.clone()));
                let mut exec = InsertExecutor::new(values, &mut self.catalog, table.clone(), columns.clone())?;
                exec.init(&mut self.pager)?;
                let count = exec.next(&mut self.pager)?.map(|r| count_value(&r.row)).unwrap_or(0);
                Ok(QueryResult::affected(count))
            }
            Statement::Update { table, assignments, .. } => {
                let plan = Planner::new(&self.catalog).plan(stmt).expect("UPDATE always plans a scan");
                let child = build_scan(&self.catalog, &plan.table, &plan.scan)?;
                let mut exec = UpdateExecutor::new(child, &mut self.catalog, table.clone(), assignments.clone())?;
                exec.init(&mut self.pager)?;
                let count = exec.next(&mut self.pager)?.map(|r| count_value(&r.row)).unwrap_or(0);
                Ok(QueryResult::affected(count))
            }
            Statement::Delete { table, .. } => {
                let plan = Planner::new(&self.catalog).plan(stmt).expect("DELETE always plans a scan");
                let child = build_scan(&self.catalog, &plan.table, &plan.scan)?;
                let mut exec = DeleteExecutor::new(child, &mut self.catalog, table.clone())?;
                exec.init(&mut self.pager)?;
                let count = exec.next(&mut self.pager)?.map(|r| count_value(&r.row)).unwrap_or(0);
                Ok(QueryResult::affected(count))
            }
            Statement::Select { .. } => unreachable!("SELECT is routed through execute_select"),
        }
    }

    fn execute_select(&mut self, stmt: &Statement) -> DbResult<QueryResult> {
        let Statement::Select { projection, limit, offset, .. } = stmt else {
            unreachable!("caller only passes Select statements");
        };
        let plan = Planner::new(&self.catalog).plan(stmt).expect("SELECT always plans a scan");
        let table_desc = self
            .catalog
            .get_table(&plan.table)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(plan.table.clone()))?;

        let mut exec: Box<dyn Executor> = build_scan(&self.catalog, &plan.table, &plan.scan)?;
        if plan.sort_in_memory {
            exec = Box::new(SortExecutor::new(exec, plan.order_by.clone(), table_desc.clone()));
        }
        exec = Box::new(LimitExecutor::new(exec, *limit, *offset));
        exec = Box::new(ProjectionExecutor::new(exec, projection.clone(), table_desc.clone()));

        let columns = match projection {
            Projection::All => table_desc.columns.iter().map(|c| c.name.clone()).collect(),
            Projection::Columns(cols) => cols.clone(),
            Projection::CountStar => vec!["count".to_string()],
        };

        exec.init(&mut self.pager)?;
        let mut rows = Vec::new();
        while let Some(exec_row) = exec.next(&mut self.pager)? {
            rows.push(exec_row.row.values);
        }
        Ok(QueryResult { columns, rows })
    }
}

fn count_value(row: &crate::value::Row) -> i64 {
    match row.values.first() {
        Some(Some(Value::Int8(n))) => *n,
        _ => 0,
    }
}

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}
