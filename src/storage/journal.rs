//! Rollback journal (spec §4.2, §6 "Crash recovery").
//!
//! nimbus has no journal at all — single-page buffer pool writes go straight
//! to the file with no crash story. This is new code, grounded in shape on
//! `frankensqlite`'s WAL crate (magic + version header, per-record CRC,
//! explicit commit marker, replay-on-open) but implemented as a rollback
//! journal rather than a write-ahead log: before a transaction's commit
//! writes touch the main database file, every page it is about to overwrite
//! gets its pre-image appended here. Once every write has landed in the main
//! file, a commit marker is appended and the file is deleted. A journal found
//! on open without a trailing marker means the previous process died mid
//! commit; its pre-images are replayed back into the main file to undo the
//! partial write, then it is deleted.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use tracing::{info, warn};

use crate::constants::{JOURNAL_COMMIT_MARKER, JOURNAL_MAGIC, JOURNAL_VERSION, PAGE_SIZE};
use crate::error::{DbError, DbResult};
use crate::storage::disk::FileManager;
use crate::storage::page::base::{PageBuf, PageIdx};

const HEADER_LEN: usize = 8 + 4;
const RECORD_LEN: usize = 4 + 4 + PAGE_SIZE;

pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn for_database(db_path: &str) -> Self {
        Self {
            path: PathBuf::from(format!("{db_path}-journal")),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Runs crash recovery against `db_path`'s journal, if one exists,
    /// replaying pre-images when the journal was left without a commit
    /// marker. Must run before the pager opens the database file.
    pub fn recover(db_path: &str) -> DbResult<()> {
        let journal = Self::for_database(db_path);
        if !journal.exists() {
            return Ok(());
        }
        info!(path = %journal.path.display(), "found journal, checking for crash recovery");
        let records = journal.read()?;
        match records {
            Some(records) => {
                warn!(pages = records.len(), "replaying journal: last commit did not complete");
                let mut file = FileManager::open(db_path)?;
                for (idx, preimage) in &records {
                    file.write_page(*idx, preimage)?;
                }
                file.sync()?;
            }
            None => {
                info!("journal has a commit marker, previous commit completed cleanly");
            }
        }
        journal.delete()?;
        Ok(())
    }

    /// Writes a new journal containing one pre-image per page about to be
    /// overwritten, without a commit marker yet.
    pub fn begin(&self, preimages: &[(PageIdx, Box<PageBuf>)]) -> DbResult<()> {
        let mut file = fs::File::create(&self.path)?;
        file.write_all(JOURNAL_MAGIC)?;
        file.write_all(&JOURNAL_VERSION.to_le_bytes())?;
        for (idx, buf) in preimages {
            let crc = crc32c::crc32c(buf.as_slice());
            file.write_all(&idx.to_le_bytes())?;
            file.write_all(&crc.to_le_bytes())?;
            file.write_all(buf.as_slice())?;
        }
        file.sync_all()?;
        Ok(())
    }

    /// Appends the commit marker, signalling that every write this
    /// transaction made to the main file has landed durably.
    pub fn commit(&self) -> DbResult<()> {
        let mut file = fs::OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&JOURNAL_COMMIT_MARKER.to_le_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    pub fn delete(&self) -> DbResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Reads the journal's pre-image records. Returns `None` if the journal
    /// ends with a valid commit marker (nothing to replay), `Some(records)`
    /// if it was left incomplete.
    fn read(&self) -> DbResult<Option<Vec<(PageIdx, Box<PageBuf>)>>> {
        let mut bytes = Vec::new();
        fs::File::open(&self.path)?.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_LEN || &bytes[0..8] != JOURNAL_MAGIC {
            return Err(DbError::CorruptJournal("bad magic or truncated header".into()));
        }
        let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if version != JOURNAL_VERSION {
            return Err(DbError::CorruptJournal(format!(
                "unsupported journal version {version}"
            )));
        }

        let body = &bytes[HEADER_LEN..];
        let mut records = Vec::new();
        let mut cursor = 0usize;
        while cursor + RECORD_LEN <= body.len() {
            let idx = u32::from_le_bytes(body[cursor..cursor + 4].try_into().unwrap());
            let crc = u32::from_le_bytes(body[cursor + 4..cursor + 8].try_into().unwrap());
            let page_bytes = &body[cursor + 8..cursor + 8 + PAGE_SIZE];
            if crc32c::crc32c(page_bytes) != crc {
                return Err(DbError::CorruptJournal(format!(
                    "checksum mismatch for page {idx} pre-image"
                )));
            }
            let mut buf: Box<PageBuf> = Box::new([0u8; PAGE_SIZE]);
            buf.copy_from_slice(page_bytes);
            records.push((idx, buf));
            cursor += RECORD_LEN;
        }

        let has_marker = body.len() >= cursor + 4
            && u32::from_le_bytes(body[cursor..cursor + 4].try_into().unwrap())
                == JOURNAL_COMMIT_MARKER;

        Ok(if has_marker { None } else { Some(records) })
    }
}
