//! `ANALYZE`: refreshes `(n_entry, n_distinct_1..n_distinct_k)` for every
//! index on a table by one full index scan (spec §4.9), feeding the
//! planner's selectivity formulas (spec §4.8).
//!
//! nimbus has no statistics pass at all; this is new, in the same
//! single-shot "drain and return one summary row" shape nimbus's
//! `InsertExecutor`/`DeleteExecutor` use for their affected-row counts.

use std::collections::HashSet;

use crate::catalog::manager::{Catalog, IndexStats};
use crate::error::{DbError, DbResult};
use crate::key::IndexKey;
use crate::storage::pager::Pager;
use crate::value::{Row, Value};

use super::executor::{ExecRow, Executor};

pub struct AnalyzeExecutor<'a> {
    catalog: &'a mut Catalog,
    table_name: String,
    done: bool,
}

impl<'a> AnalyzeExecutor<'a> {
    pub fn new(catalog: &'a mut Catalog, table_name: String) -> Self {
        Self { catalog, table_name, done: false }
    }
}

impl<'a> Executor for AnalyzeExecutor<'a> {
    fn init(&mut self, _pager: &mut Pager) -> DbResult<()> {
        self.done = false;
        Ok(())
    }

    fn next(&mut self, pager: &mut Pager) -> DbResult<Option<ExecRow>> {
        if self.done {
            return Ok(None);
        }
        let index_names = self.catalog.indexes_for_table(&self.table_name).to_vec();
        for index_name in &index_names {
            let tree = self
                .catalog
                .open_index_tree(index_name)
                .ok_or_else(|| DbError::IndexNotFound(index_name.clone()))?;
            let entries = tree.scan_range(pager, None, None, true)?;
            let n_entry = entries.len() as u64;
            let k = tree.key_kinds.len().max(1);
            let mut distinct: Vec<HashSet<Vec<u8>>> = vec![HashSet::new(); k];
            for (key, _row_id) in &entries {
                for (slot, part) in distinct.iter_mut().zip(key_parts(key, k)) {
                    slot.insert(part);
                }
            }
            let n_distinct = distinct.iter().map(|s| s.len() as u64).collect();
            self.catalog.record_index_stats(index_name, IndexStats { n_entry, n_distinct });
        }
        self.done = true;
        Ok(Some(ExecRow { row_id: None, row: Row::new(vec![Some(Value::Int8(index_names.len() as i64))]) }))
    }
}

/// Splits an index key into `k` encoded parts, one per indexed column, so
/// distinct counts can be tracked per column even for a composite key.
fn key_parts(key: &IndexKey, k: usize) -> Vec<Vec<u8>> {
    match key {
        IndexKey::Composite(parts) => parts.iter().map(IndexKey::encode).collect(),
        single => {
            let mut parts = vec![single.encode()];
            parts.resize(k, Vec::new());
            parts
        }
    }
}
