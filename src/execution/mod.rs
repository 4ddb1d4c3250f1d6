//! The pull-based executor pipeline (spec §4.9): `SELECT`/`UPDATE`/`DELETE`
//! all start from the scan the planner chose, `INSERT` from a `VALUES` list,
//! and every statement's child executors chain through `Box<dyn Executor>`
//! the way nimbus's own executors nest.

pub mod analyze;
pub mod delete;
pub mod executor;
pub mod filter;
pub mod index_scan;
pub mod insert;
pub mod limit;
pub mod projection;
pub mod seq_scan;
pub mod sort;
pub mod update;
pub mod values;

pub use executor::{ExecRow, Executor};

use crate::catalog::manager::Catalog;
use crate::error::{DbError, DbResult};
use crate::planner::{Scan, ScanKind};

use filter::FilterExecutor;
use index_scan::IndexScanExecutor;
use seq_scan::SeqScanExecutor;

/// Builds the scan (plus any leftover filter) a [`Scan`] describes, reusable
/// across `SELECT`, `UPDATE` and `DELETE` statement execution.
pub fn build_scan(catalog: &Catalog, table: &str, scan: &Scan) -> DbResult<Box<dyn Executor>> {
    let table_desc = catalog.get_table(table).cloned().ok_or_else(|| DbError::TableNotFound(table.to_string()))?;

    let base: Box<dyn Executor> = match &scan.kind {
        ScanKind::Sequential => {
            let tree = catalog.open_table_tree(table).ok_or_else(|| DbError::TableNotFound(table.to_string()))?;
            Box::new(SeqScanExecutor::new(tree, table_desc.clone()))
        }
        ScanKind::IndexPoint | ScanKind::IndexRange | ScanKind::IndexAll => {
            let index_name = scan.index_name.as_deref().expect("index-backed scans always name an index");
            let index = catalog.open_index_tree(index_name).ok_or_else(|| DbError::IndexNotFound(index_name.to_string()))?;
            let table_tree = catalog.open_table_tree(table).ok_or_else(|| DbError::TableNotFound(table.to_string()))?;
            Box::new(IndexScanExecutor::new(
                index,
                table_tree,
                table_desc.clone(),
                scan.kind.clone(),
                scan.index_key.clone(),
                scan.range.clone(),
                scan.reverse,
            ))
        }
    };

    if scan.filters.is_empty() {
        Ok(base)
    } else {
        Ok(Box::new(FilterExecutor::new(base, scan.filters.clone(), table_desc)))
    }
}
