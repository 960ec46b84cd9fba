use std::collections::HashMap;
use std::sync::Arc;
use log::{debug, info, warn};
use thiserror::Error;

use crate::common::types::{Lsn, Page, Rid, TxnId, INVALID_LSN, INVALID_PAGE_ID, LOG_BUFFER_SIZE};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::disk::{DiskManager, DiskManagerError};
use crate::storage::page::{PageError, PageManager};
use crate::wal::log_record::{LogPayload, LogRecord, LogRecordType};

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Disk manager error: {0}")]
    DiskManagerError(#[from] DiskManagerError),

    #[error("Buffer pool error: {0}")]
    BufferPoolError(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    PageError(#[from] PageError),
}

/// Startup driver that replays the write-ahead log: a redo pass that
/// reapplies every logged effect the crash lost, then an undo pass that
/// rolls back transactions with no COMMIT or ABORT record.
pub struct LogRecovery {
    disk_manager: Arc<DiskManager>,
    buffer_pool: Arc<BufferPoolManager>,
    page_manager: PageManager,

    /// File offset of the next unread log chunk.
    offset: u64,
    log_buffer: Vec<u8>,

    /// Transaction id -> last seen LSN. Whatever remains after the redo pass
    /// are the losers.
    active_txn: HashMap<TxnId, Lsn>,
    /// LSN -> byte offset of the record in the log file.
    lsn_mapping: HashMap<Lsn, u64>,
}

impl LogRecovery {
    pub fn new(disk_manager: Arc<DiskManager>, buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            disk_manager,
            buffer_pool,
            page_manager: PageManager::new(),
            offset: 0,
            log_buffer: vec![0; LOG_BUFFER_SIZE],
            active_txn: HashMap::new(),
            lsn_mapping: HashMap::new(),
        }
    }

    /// Run both recovery passes.
    pub fn recover(&mut self) -> Result<(), RecoveryError> {
        info!("recovery: redo pass");
        self.redo()?;
        info!("recovery: undo pass, {} loser transaction(s)", self.active_txn.len());
        self.undo()?;
        info!("recovery complete");
        Ok(())
    }

    /// Redo pass: stream the log from the start, rebuild the transaction and
    /// LSN tables, and reapply each record whose target page is older than
    /// the record. A record is applied only when `page lsn < record lsn`,
    /// and the page is stamped with the record LSN afterwards, so rerunning
    /// the pass is idempotent.
    pub fn redo(&mut self) -> Result<(), RecoveryError> {
        while self.disk_manager.read_log(&mut self.log_buffer, self.offset)? {
            let mut pos = 0;

            loop {
                let record = match LogRecord::deserialize(&self.log_buffer[pos..]) {
                    Some(record) => record,
                    None => break,
                };

                self.lsn_mapping.insert(record.lsn, self.offset + pos as u64);
                self.active_txn.insert(record.txn_id, record.lsn);
                pos += record.size as usize;

                if matches!(record.record_type, LogRecordType::Commit | LogRecordType::Abort) {
                    self.active_txn.remove(&record.txn_id);
                } else {
                    self.redo_record(&record)?;
                }
            }

            if pos == 0 {
                // Nothing in this chunk deserialized: either a record
                // truncated by a crash mid-flush or trailing garbage.
                warn!("recovery: discarding malformed log tail at offset {}", self.offset);
                break;
            }

            self.offset += pos as u64;
        }

        Ok(())
    }

    fn redo_record(&self, record: &LogRecord) -> Result<(), RecoveryError> {
        match &record.payload {
            LogPayload::Transaction => {}

            LogPayload::Insert { rid, tuple } => {
                self.redo_on_page(*rid, record.lsn, |pm, page| {
                    pm.insert_record(page, tuple)?;
                    Ok(())
                })?;
            }

            LogPayload::Update { rid, new_tuple, .. } => {
                self.redo_on_page(*rid, record.lsn, |pm, page| {
                    pm.update_record(page, rid.slot_num, new_tuple)?;
                    Ok(())
                })?;
            }

            LogPayload::Delete { rid, .. } => {
                let record_type = record.record_type;
                self.redo_on_page(*rid, record.lsn, |pm, page| {
                    match record_type {
                        LogRecordType::MarkDelete => pm.mark_delete(page, rid.slot_num)?,
                        LogRecordType::ApplyDelete => {
                            pm.apply_delete(page, rid.slot_num)?;
                        }
                        _ => pm.rollback_delete(page, rid.slot_num)?,
                    }
                    Ok(())
                })?;
            }

            LogPayload::NewPage { prev_page_id, page_id } => {
                let page_ptr = self.buffer_pool.fetch_page(*page_id)?;
                let applied = {
                    let mut page = page_ptr.write();
                    if page.lsn < record.lsn {
                        let prev = (*prev_page_id != INVALID_PAGE_ID).then_some(*prev_page_id);
                        self.page_manager.init_page(&mut page, prev);
                        self.page_manager.set_lsn(&mut page, record.lsn);
                        true
                    } else {
                        false
                    }
                };

                if applied && *prev_page_id != INVALID_PAGE_ID {
                    // Patch the predecessor's forward link if the crash lost it.
                    let prev_ptr = self.buffer_pool.fetch_page(*prev_page_id)?;
                    let patched = {
                        let mut prev_page = prev_ptr.write();
                        if self.page_manager.next_page_id(&prev_page) != Some(*page_id) {
                            self.page_manager.set_next_page_id(&mut prev_page, Some(*page_id));
                            true
                        } else {
                            false
                        }
                    };
                    self.buffer_pool.unpin_page(*prev_page_id, patched)?;
                }

                self.buffer_pool.unpin_page(*page_id, applied)?;
            }
        }

        Ok(())
    }

    /// Fetch the record's page, apply `op` if the page predates the record,
    /// stamp the record LSN, and unpin with the matching dirty bit.
    fn redo_on_page<F>(&self, rid: Rid, lsn: Lsn, op: F) -> Result<(), RecoveryError>
    where
        F: FnOnce(&PageManager, &mut Page) -> Result<(), RecoveryError>,
    {
        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
        let applied = {
            let mut page = page_ptr.write();
            if page.lsn < lsn {
                op(&self.page_manager, &mut page)?;
                self.page_manager.set_lsn(&mut page, lsn);
                true
            } else {
                false
            }
        };
        self.buffer_pool.unpin_page(rid.page_id, applied)?;
        Ok(())
    }

    /// Undo pass: walk each loser transaction's chain backwards through
    /// `prev_lsn`, applying the inverse of every data operation.
    pub fn undo(&mut self) -> Result<(), RecoveryError> {
        let losers: Vec<(TxnId, Lsn)> =
            self.active_txn.iter().map(|(&txn, &lsn)| (txn, lsn)).collect();

        for (txn_id, mut lsn) in losers {
            debug!("recovery: undoing transaction {}", txn_id);

            while lsn != INVALID_LSN {
                let record_offset = match self.lsn_mapping.get(&lsn) {
                    Some(&offset) => offset,
                    None => break,
                };

                self.disk_manager.read_log(&mut self.log_buffer, record_offset)?;
                let record = match LogRecord::deserialize(&self.log_buffer) {
                    Some(record) => record,
                    None => break,
                };
                lsn = record.prev_lsn;

                self.undo_record(&record)?;
            }
        }

        self.active_txn.clear();
        self.lsn_mapping.clear();
        Ok(())
    }

    fn undo_record(&self, record: &LogRecord) -> Result<(), RecoveryError> {
        match &record.payload {
            LogPayload::Transaction | LogPayload::NewPage { .. } => Ok(()),

            // Undo an insert by physically deleting the tuple.
            LogPayload::Insert { rid, .. } => self.undo_on_page(*rid, |pm, page| {
                pm.apply_delete(page, rid.slot_num)?;
                Ok(())
            }),

            // Undo an update by restoring the old image.
            LogPayload::Update { rid, old_tuple, .. } => self.undo_on_page(*rid, |pm, page| {
                pm.update_record(page, rid.slot_num, old_tuple)?;
                Ok(())
            }),

            LogPayload::Delete { rid, tuple } => {
                let record_type = record.record_type;
                self.undo_on_page(*rid, |pm, page| {
                    match record_type {
                        // A pending delete is cancelled; a physical delete is
                        // re-inserted; an undone delete is re-marked.
                        LogRecordType::MarkDelete => pm.rollback_delete(page, rid.slot_num)?,
                        LogRecordType::ApplyDelete => {
                            pm.insert_record_at(page, rid.slot_num, tuple)?
                        }
                        _ => pm.mark_delete(page, rid.slot_num)?,
                    }
                    Ok(())
                })
            }
        }
    }

    fn undo_on_page<F>(&self, rid: Rid, op: F) -> Result<(), RecoveryError>
    where
        F: FnOnce(&PageManager, &mut Page) -> Result<(), RecoveryError>,
    {
        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
        {
            let mut page = page_ptr.write();
            op(&self.page_manager, &mut page)?;
        }
        self.buffer_pool.unpin_page(rid.page_id, true)?;
        Ok(())
    }
}
