//! Typed error surface for the storage and execution core (spec §7).
//!
//! nimbus itself propagates `String`s everywhere; that is the outlier in this
//! corpus, not the idiom to imitate. `erictune-diydb` uses `thiserror` for the
//! same kind of embedded-SQL-engine error surface, so this crate does too.

use std::io;

use crate::storage::page::base::PageIdx;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validate(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("index already exists: {0}")]
    IndexExists(String),

    #[error("duplicate key for unique index {index}: {key}")]
    DuplicateKey { index: String, key: String },

    #[error("NULL value for non-nullable column {0}")]
    ConstraintNull(String),

    #[error("transaction conflict on page {conflicting_page} (tx {tx_id})")]
    TxConflict { tx_id: u64, conflicting_page: u32 },

    #[error("corrupt page {page}: {reason}")]
    CorruptPage { page: PageIdx, reason: String },

    #[error("corrupt journal: {0}")]
    CorruptJournal(String),

    #[error("wrong page kind at {page}: expected {expected}, found {found}")]
    WrongPageKind {
        page: PageIdx,
        expected: &'static str,
        found: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

pub type DbResult<T> = Result<T, DbError>;
