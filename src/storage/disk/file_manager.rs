//! Raw page-addressed file I/O.
//!
//! Grounded on nimbus's `storage::disk::file_manager::FileManager`: opens the
//! backing file with `O_DIRECT`, seeks to `page_idx * PAGE_SIZE` and does a
//! plain `read_exact`/`write_all`. Generalized from nimbus's two free
//! functions into `read_page`/`write_page` that work in page indices instead
//! of byte offsets, since every caller above this layer thinks in pages.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;

use crate::constants::PAGE_SIZE;
use crate::storage::page::base::{PageBuf, PageIdx};

pub struct FileManager {
    file: File,
}

impl FileManager {
    pub fn open(path: &str) -> io::Result<Self> {
        if cfg!(windows) {
            panic!("non-Unix systems are not supported");
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .custom_flags(libc::O_DIRECT)
            .open(path)?;
        Ok(Self { file })
    }

    /// Opens without `O_DIRECT`, for tests that want a plain tmpfile without
    /// worrying about sector alignment.
    #[cfg(test)]
    pub fn open_buffered(path: &str) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self { file })
    }

    pub fn read_page(&mut self, idx: PageIdx, buf: &mut PageBuf) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(byte_offset(idx)))?;
        self.file.read_exact(buf)
    }

    pub fn write_page(&mut self, idx: PageIdx, buf: &PageBuf) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(byte_offset(idx)))?;
        self.file.write_all(buf)
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Extends the file by one page and returns its index.
    pub fn allocate_page(&mut self) -> io::Result<PageIdx> {
        let current_len = self.file.seek(SeekFrom::End(0))?;
        let idx = (current_len / PAGE_SIZE as u64) as PageIdx;
        self.file.set_len(current_len + PAGE_SIZE as u64)?;
        Ok(idx)
    }

    pub fn num_pages(&mut self) -> io::Result<u32> {
        let len = self.file.seek(SeekFrom::End(0))?;
        Ok((len / PAGE_SIZE as u64) as u32)
    }
}

fn byte_offset(idx: PageIdx) -> u64 {
    idx as u64 * PAGE_SIZE as u64
}
