use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Page, PageId, PAGE_SIZE};
use crate::storage::page::PageHeader;

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager owns the database file and the log file and performs all
/// actual disk I/O. Page ids map to byte offsets `page_id * PAGE_SIZE` in
/// the database file; the log file is an append-only byte stream.
pub struct DiskManager {
    db_file: Mutex<File>,
    log_file: Mutex<File>,
    next_page_id: AtomicI32,
}

impl DiskManager {
    /// Open (or create) the database and log files. The next page id is
    /// derived from the database file length, so page ids keep growing
    /// across restarts.
    pub fn new(db_path: impl AsRef<Path>, log_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let db_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        let log_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(log_path)?;

        let db_len = db_file.metadata()?.len();
        let next_page_id = ((db_len + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64) as PageId;

        Ok(Self {
            db_file: Mutex::new(db_file),
            log_file: Mutex::new(log_file),
            next_page_id: AtomicI32::new(next_page_id),
        })
    }

    /// Read a page from disk. Reading past the end of the file is not an
    /// error: the page comes back zeroed, which is how fresh pages look.
    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        if page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        page.data.fill(0);

        {
            let mut file = self.db_file.lock();
            let file_size = file.metadata()?.len();

            if offset < file_size {
                file.seek(SeekFrom::Start(offset))?;
                let mut filled = 0;
                while filled < PAGE_SIZE {
                    let n = file.read(&mut page.data[filled..])?;
                    if n == 0 {
                        break;
                    }
                    filled += n;
                }
            }
        }

        page.page_id = page_id;
        page.lsn = PageHeader::from_bytes(&page.data).lsn;

        Ok(())
    }

    /// Write a page to disk, extending the file if needed. Flushed on every
    /// write so a subsequent read observes it.
    pub fn write_page(&self, page: &Page) -> Result<(), DiskManagerError> {
        if page.page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page.page_id));
        }

        let offset = page.page_id as u64 * PAGE_SIZE as u64;

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.data)?;
        file.flush()?;

        Ok(())
    }

    /// Hand out the next page id. Purely in-memory; the file is extended
    /// lazily by the first write.
    pub fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    /// No free-space map is kept, so deallocated ids are never reused.
    pub fn deallocate_page(&self, _page_id: PageId) {}

    /// Append a byte range to the log file and sync it to disk.
    pub fn write_log(&self, data: &[u8]) -> Result<(), DiskManagerError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.log_file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        file.sync_data()?;

        Ok(())
    }

    /// Read up to `buf.len()` bytes of the log starting at `offset`. Returns
    /// `false` at end of stream; the unread tail of `buf` is zeroed.
    pub fn read_log(&self, buf: &mut [u8], offset: u64) -> Result<bool, DiskManagerError> {
        buf.fill(0);

        let mut file = self.log_file.lock();
        let file_size = file.metadata()?.len();
        if offset >= file_size {
            return Ok(false);
        }

        file.seek(SeekFrom::Start(offset))?;
        let wanted = buf.len().min((file_size - offset) as usize);
        let mut filled = 0;
        while filled < wanted {
            let n = file.read(&mut buf[filled..wanted])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Ok(true)
    }

    pub fn log_size(&self) -> Result<u64, DiskManagerError> {
        Ok(self.log_file.lock().metadata()?.len())
    }

    /// Sync and release both files.
    pub fn shut_down(&self) -> Result<(), DiskManagerError> {
        self.db_file.lock().sync_all()?;
        self.log_file.lock().sync_all()?;
        Ok(())
    }
}
