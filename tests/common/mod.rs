use std::sync::Arc;
use anyhow::Result;
use tempfile::NamedTempFile;

use marrowdb::storage::buffer::BufferPoolManager;
use marrowdb::storage::disk::DiskManager;
use marrowdb::wal::log_manager::{LogManager, LogManagerConfig};

// Temporary database and log files for one test
#[allow(dead_code)]
pub fn create_temp_files() -> Result<(NamedTempFile, NamedTempFile)> {
    Ok((NamedTempFile::new()?, NamedTempFile::new()?))
}

#[allow(dead_code)]
pub fn create_test_disk_manager() -> Result<(Arc<DiskManager>, NamedTempFile, NamedTempFile)> {
    let (db_file, log_file) = create_temp_files()?;
    let disk_manager = Arc::new(DiskManager::new(db_file.path(), log_file.path())?);
    Ok((disk_manager, db_file, log_file))
}

// Create a buffer pool manager over temporary files, without logging
#[allow(dead_code)]
pub fn create_test_buffer_pool(
    pool_size: usize,
) -> Result<(Arc<BufferPoolManager>, NamedTempFile, NamedTempFile)> {
    let (disk_manager, db_file, log_file) = create_test_disk_manager()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
    Ok((buffer_pool, db_file, log_file))
}

// Create a buffer pool manager with a running log manager wired in
#[allow(dead_code)]
pub fn create_logged_buffer_pool(
    pool_size: usize,
    config: LogManagerConfig,
) -> Result<(
    Arc<BufferPoolManager>,
    Arc<LogManager>,
    NamedTempFile,
    NamedTempFile,
)> {
    let (disk_manager, db_file, log_file) = create_test_disk_manager()?;
    let log_manager = Arc::new(LogManager::with_config(disk_manager.clone(), config));
    log_manager.run_flush_thread();
    let buffer_pool = Arc::new(BufferPoolManager::with_log_manager(
        pool_size,
        disk_manager,
        Some(log_manager.clone()),
    ));
    Ok((buffer_pool, log_manager, db_file, log_file))
}

// Generate test data of specified size
#[allow(dead_code)]
pub fn generate_test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}
