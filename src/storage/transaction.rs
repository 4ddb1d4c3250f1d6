//! Optimistic concurrency control (spec §4.3).
//!
//! Grounded on nimbus's `storage::transaction::Transaction`: a transaction
//! collects writes against the buffer pool and flushes them atomically on
//! commit. nimbus has no read-set, no page versioning and no conflict
//! detection at all — every transaction commits unconditionally. This adds
//! the spec's optimistic layer on top of that same collect-then-flush shape,
//! but the write-set itself lives in [`crate::storage::pager::Pager`]: every
//! page a transaction's table/index-tree calls touch gets a pre-image and an
//! observed version snapshotted there the first time it is fetched
//! (`Pager::begin_capture`/`fetch`), since those calls mutate the pager's
//! cache directly rather than building a separate buffer to hand back here.
//! `TransactionManager` only owns the serialization (one commit at a time)
//! and the decision of whether to keep or roll back what the pager captured.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{instrument, warn};

use crate::error::{DbError, DbResult};
use crate::storage::journal::Journal;
use crate::storage::pager::Pager;

pub type TxId = u64;

/// A transaction's identity. Carries no data of its own: the pages it
/// touches and their pre-transaction state live in the [`Pager`]'s capture
/// session between [`TransactionManager::begin`] and
/// [`TransactionManager::commit`]/[`TransactionManager::abort`].
pub struct Transaction {
    pub id: TxId,
}

/// Serializes commits and owns the rollback journal. Wraps a [`Journal`]
/// rather than a raw file, matching nimbus's `Transaction::commit` taking
/// the buffer pool as its target.
pub struct TransactionManager {
    next_tx_id: AtomicU64,
    commit_lock: Mutex<()>,
    journal: Journal,
}

impl TransactionManager {
    pub fn new(db_path: &str) -> Self {
        Self {
            next_tx_id: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
            journal: Journal::for_database(db_path),
        }
    }

    /// Begins a transaction and starts the pager's capture session. Every
    /// page the statement touches through `pager.fetch` from this point on
    /// is snapshotted on first touch.
    pub fn begin(&self, pager: &mut Pager) -> Transaction {
        let id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        pager.begin_capture();
        Transaction { id }
    }

    /// Validates every page the transaction touched against its current
    /// version, then journals pre-images, bumps versions and flushes if they
    /// all still match. Rolls the pager's cache back to the pre-transaction
    /// content and returns [`DbError::TxConflict`] on the first mismatch.
    /// Serialized by a single mutex, matching nimbus's single-writer commit.
    #[instrument(skip(self, tx, pager), fields(tx_id = tx.id))]
    pub fn commit(&self, tx: Transaction, pager: &mut Pager) -> DbResult<()> {
        let _guard = self.commit_lock.lock().unwrap();

        if let Some(page) = pager.conflicting_page() {
            warn!(page, tx_id = tx.id, "optimistic conflict");
            pager.abort_capture();
            return Err(DbError::TxConflict { tx_id: tx.id, conflicting_page: page });
        }

        let preimages = pager.commit_capture();
        if preimages.is_empty() {
            return Ok(());
        }
        self.journal.begin(&preimages)?;
        pager.flush_all()?;
        self.journal.commit()?;
        self.journal.delete()?;
        Ok(())
    }

    /// Rolls back a transaction without committing, restoring the pager's
    /// cache to what it held before the transaction began (spec §4.9,
    /// statement-level failure abandons its own writes).
    pub fn abort(&self, pager: &mut Pager) {
        pager.abort_capture();
    }
}
