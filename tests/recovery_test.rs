use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;

use marrowdb::common::types::{Rid, INVALID_PAGE_ID};
use marrowdb::storage::buffer::BufferPoolManager;
use marrowdb::storage::disk::DiskManager;
use marrowdb::storage::page::PageManager;
use marrowdb::wal::log_manager::{LogManager, LogManagerConfig};
use marrowdb::wal::log_record::{LogRecord, LogRecordType};
use marrowdb::wal::recovery::LogRecovery;

mod common;
use common::create_test_disk_manager;

fn test_config() -> LogManagerConfig {
    LogManagerConfig {
        buffer_size: 64 * 1024,
        flush_timeout: Duration::from_secs(10),
    }
}

/// Write a small committed transaction and one loser transaction into the
/// log, without ever writing the data pages themselves. Returns the page id
/// the transactions touched.
fn write_crash_log(disk_manager: &Arc<DiskManager>) -> Result<i32> {
    let log_manager = Arc::new(LogManager::with_config(disk_manager.clone(), test_config()));
    log_manager.run_flush_thread();

    let page_id = disk_manager.allocate_page();

    // Committed transaction: create the page and insert one record
    let mut begin = LogRecord::new_begin(1);
    let begin_lsn = log_manager.append_log_record(&mut begin);

    let mut new_page = LogRecord::new_page(1, begin_lsn, INVALID_PAGE_ID, page_id);
    let new_page_lsn = log_manager.append_log_record(&mut new_page);

    let mut insert = LogRecord::new_insert(1, new_page_lsn, Rid::new(page_id, 0), b"hello".to_vec());
    let insert_lsn = log_manager.append_log_record(&mut insert);

    let mut commit = LogRecord::new_commit(1, insert_lsn);
    log_manager.append_log_record(&mut commit);

    // Loser transaction: inserts but never commits
    let mut begin = LogRecord::new_begin(2);
    let begin_lsn = log_manager.append_log_record(&mut begin);

    let mut insert = LogRecord::new_insert(2, begin_lsn, Rid::new(page_id, 1), b"world".to_vec());
    log_manager.append_log_record(&mut insert);

    // Make the log durable, then "crash" before any data page reaches disk
    log_manager.stop_flush_thread();
    Ok(page_id)
}

#[test]
fn test_redo_replays_lost_effects() -> Result<()> {
    let (disk_manager, _db, _log) = create_test_disk_manager()?;
    let page_id = write_crash_log(&disk_manager)?;

    let buffer_pool = Arc::new(BufferPoolManager::new(10, disk_manager.clone()));
    let mut recovery = LogRecovery::new(disk_manager, buffer_pool.clone());
    recovery.redo()?;

    let page_manager = PageManager::new();
    let page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = page.read();
        assert_eq!(page_manager.get_record(&page_guard, 0)?, b"hello");
        // Undo has not run yet, so the loser's insert is still present
        assert_eq!(page_manager.get_record(&page_guard, 1)?, b"world");
    }
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_recover_undoes_losers() -> Result<()> {
    let (disk_manager, _db, _log) = create_test_disk_manager()?;
    let page_id = write_crash_log(&disk_manager)?;

    let buffer_pool = Arc::new(BufferPoolManager::new(10, disk_manager.clone()));
    let mut recovery = LogRecovery::new(disk_manager, buffer_pool.clone());
    recovery.recover()?;

    let page_manager = PageManager::new();
    let page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = page.read();
        // The committed insert survives; the loser's insert is rolled back
        assert_eq!(page_manager.get_record(&page_guard, 0)?, b"hello");
        assert!(page_manager.get_record(&page_guard, 1).is_err());
    }
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_redo_is_idempotent() -> Result<()> {
    let (disk_manager, _db, _log) = create_test_disk_manager()?;
    let page_id = write_crash_log(&disk_manager)?;

    // First recovery, then persist the pages
    let buffer_pool = Arc::new(BufferPoolManager::new(10, disk_manager.clone()));
    let mut recovery = LogRecovery::new(disk_manager.clone(), buffer_pool.clone());
    recovery.recover()?;
    buffer_pool.flush_all_pages()?;

    let page_manager = PageManager::new();
    let snapshot = {
        let page = buffer_pool.fetch_page(page_id)?;
        let data = page.read().data.to_vec();
        buffer_pool.unpin_page(page_id, false)?;
        data
    };
    drop(buffer_pool);

    // Replaying the redo pass over the recovered pages must change nothing:
    // every record's LSN is no newer than its page
    let buffer_pool = Arc::new(BufferPoolManager::new(10, disk_manager.clone()));
    let mut recovery = LogRecovery::new(disk_manager, buffer_pool.clone());
    recovery.redo()?;

    let page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = page.read();
        assert_eq!(page_guard.data.to_vec(), snapshot);
        assert_eq!(page_manager.get_record(&page_guard, 0)?, b"hello");
    }
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_update_and_delete_chains_recover() -> Result<()> {
    let (disk_manager, _db, _log) = create_test_disk_manager()?;
    {
        let log_manager = Arc::new(LogManager::with_config(disk_manager.clone(), test_config()));
        log_manager.run_flush_thread();

        let page_id = disk_manager.allocate_page();
        assert_eq!(page_id, 0);

        // Committed: new page, insert, update, mark delete + rollback
        let mut lsn = log_manager.append_log_record(&mut LogRecord::new_begin(1));
        lsn = log_manager.append_log_record(&mut LogRecord::new_page(1, lsn, INVALID_PAGE_ID, page_id));
        lsn = log_manager
            .append_log_record(&mut LogRecord::new_insert(1, lsn, Rid::new(page_id, 0), b"v1".to_vec()));
        lsn = log_manager.append_log_record(&mut LogRecord::new_update(
            1,
            lsn,
            Rid::new(page_id, 0),
            b"v1".to_vec(),
            b"v2".to_vec(),
        ));
        log_manager.append_log_record(&mut LogRecord::new_commit(1, lsn));

        // Loser: updates the record and marks it deleted, then crashes
        let mut lsn = log_manager.append_log_record(&mut LogRecord::new_begin(2));
        lsn = log_manager.append_log_record(&mut LogRecord::new_update(
            2,
            lsn,
            Rid::new(page_id, 0),
            b"v2".to_vec(),
            b"v3".to_vec(),
        ));
        log_manager.append_log_record(&mut LogRecord::new_delete(
            2,
            lsn,
            LogRecordType::MarkDelete,
            Rid::new(page_id, 0),
            b"v3".to_vec(),
        ));

        log_manager.stop_flush_thread();
    }

    let buffer_pool = Arc::new(BufferPoolManager::new(10, disk_manager.clone()));
    let mut recovery = LogRecovery::new(disk_manager, buffer_pool.clone());
    recovery.recover()?;

    // The loser's mark-delete and update are both rolled back
    let page_manager = PageManager::new();
    let page = buffer_pool.fetch_page(0)?;
    {
        let page_guard = page.read();
        assert_eq!(page_manager.get_record(&page_guard, 0)?, b"v2");
    }
    buffer_pool.unpin_page(0, false)?;

    Ok(())
}

#[test]
fn test_malformed_log_tail_is_discarded() -> Result<()> {
    let (disk_manager, _db, _log) = create_test_disk_manager()?;
    let page_id = write_crash_log(&disk_manager)?;

    // Simulate a crash mid-flush: garbage after the last complete record
    disk_manager.write_log(&[0xFF; 13])?;

    let buffer_pool = Arc::new(BufferPoolManager::new(10, disk_manager.clone()));
    let mut recovery = LogRecovery::new(disk_manager, buffer_pool.clone());
    recovery.recover()?;

    // Everything before the corruption still recovered normally
    let page_manager = PageManager::new();
    let page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = page.read();
        assert_eq!(page_manager.get_record(&page_guard, 0)?, b"hello");
        assert!(page_manager.get_record(&page_guard, 1).is_err());
    }
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}
