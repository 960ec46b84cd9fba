use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use log::{error, info};
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Lsn, INVALID_LSN, LOG_BUFFER_SIZE};
use crate::storage::disk::DiskManager;
use crate::wal::log_record::LogRecord;

/// Configuration for the log manager
#[derive(Debug, Clone)]
pub struct LogManagerConfig {
    /// Size of each of the two in-memory buffers, in bytes
    pub buffer_size: usize,

    /// How long the flush thread sleeps before flushing on its own
    pub flush_timeout: Duration,
}

impl Default for LogManagerConfig {
    fn default() -> Self {
        Self {
            buffer_size: LOG_BUFFER_SIZE,
            flush_timeout: Duration::from_millis(500),
        }
    }
}

struct LogCore {
    // Records are appended to log_buffer; the flush thread swaps it with
    // flush_buffer and writes the latter out.
    log_buffer: Vec<u8>,
    flush_buffer: Vec<u8>,
    log_offset: usize,
    flush_offset: usize,
    next_lsn: Lsn,
    need_flush: bool,
}

/// State shared between appenders and the flush thread.
struct LogInner {
    core: Mutex<LogCore>,
    /// Wakes the flush thread.
    flush_cv: Condvar,
    /// Wakes appenders blocked on a full buffer and synchronous flushers.
    append_cv: Condvar,
    /// Greatest LSN guaranteed durable on disk.
    persistent_lsn: AtomicI32,
    enable_logging: AtomicBool,
    disk_manager: Arc<DiskManager>,
    config: LogManagerConfig,
}

impl LogInner {
    fn flush_loop(&self) {
        while self.enable_logging.load(Ordering::SeqCst) {
            let mut core = self.core.lock();

            if !core.need_flush {
                let _ = self.flush_cv.wait_for(&mut core, self.config.flush_timeout);
            }

            let core = &mut *core;
            if core.log_offset > 0 {
                mem::swap(&mut core.log_buffer, &mut core.flush_buffer);
                core.flush_offset = core.log_offset;
                core.log_offset = 0;
                let durable_lsn = core.next_lsn - 1;

                let len = core.flush_offset;
                if let Err(e) = self.disk_manager.write_log(&core.flush_buffer[..len]) {
                    // A log that cannot reach disk leaves nothing to recover
                    // from; give up loudly.
                    error!("WAL flush failed: {}", e);
                    panic!("WAL flush failed: {}", e);
                }
                core.flush_offset = 0;
                self.persistent_lsn.store(durable_lsn, Ordering::SeqCst);
            }

            core.need_flush = false;
            self.append_cv.notify_all();
        }
    }
}

/// Double-buffered write-ahead log writer.
///
/// Appenders fill `log_buffer` under the latch; a background flush thread
/// periodically (or on demand) swaps the buffers and writes the full one to
/// disk, then advances `persistent_lsn`. The buffer pool calls `flush`
/// before writing back any dirty page whose LSN is not yet durable.
pub struct LogManager {
    inner: Arc<LogInner>,
    flush_thread: Mutex<Option<JoinHandle<()>>>,
}

impl LogManager {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        Self::with_config(disk_manager, LogManagerConfig::default())
    }

    pub fn with_config(disk_manager: Arc<DiskManager>, config: LogManagerConfig) -> Self {
        Self {
            inner: Arc::new(LogInner {
                core: Mutex::new(LogCore {
                    log_buffer: vec![0; config.buffer_size],
                    flush_buffer: vec![0; config.buffer_size],
                    log_offset: 0,
                    flush_offset: 0,
                    next_lsn: 0,
                    need_flush: false,
                }),
                flush_cv: Condvar::new(),
                append_cv: Condvar::new(),
                persistent_lsn: AtomicI32::new(INVALID_LSN),
                enable_logging: AtomicBool::new(false),
                disk_manager,
                config,
            }),
            flush_thread: Mutex::new(None),
        }
    }

    pub fn is_logging_enabled(&self) -> bool {
        self.inner.enable_logging.load(Ordering::SeqCst)
    }

    pub fn persistent_lsn(&self) -> Lsn {
        self.inner.persistent_lsn.load(Ordering::SeqCst)
    }

    /// LSN that will be assigned to the next appended record.
    pub fn next_lsn(&self) -> Lsn {
        self.inner.core.lock().next_lsn
    }

    /// Enable logging and start the background flush thread. The thread
    /// flushes whenever the buffer fills, a flush is requested, or
    /// `flush_timeout` elapses.
    pub fn run_flush_thread(&self) {
        if self.inner.enable_logging.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("starting WAL flush thread");
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::spawn(move || inner.flush_loop());
        *self.flush_thread.lock() = Some(handle);
    }

    /// Force a final flush, disable logging, and join the flush thread.
    pub fn stop_flush_thread(&self) {
        if !self.inner.enable_logging.load(Ordering::SeqCst) {
            return;
        }

        self.flush();
        self.inner.enable_logging.store(false, Ordering::SeqCst);
        self.inner.flush_cv.notify_all();

        if let Some(handle) = self.flush_thread.lock().take() {
            if handle.join().is_err() {
                error!("WAL flush thread terminated abnormally");
            }
        }
        info!("stopped WAL flush thread");
    }

    /// Append a record to the log buffer, assigning its LSN. Blocks while
    /// the buffer is too full to take the record.
    pub fn append_log_record(&self, record: &mut LogRecord) -> Lsn {
        let inner = &*self.inner;
        let mut core = inner.core.lock();
        let size = record.size as usize;
        debug_assert!(size <= core.log_buffer.len(), "log record larger than the log buffer");

        while core.log_offset + size > core.log_buffer.len() {
            // Wake the flush thread and wait until the buffer is drained.
            core.need_flush = true;
            inner.flush_cv.notify_one();
            inner.append_cv.wait(&mut core);
        }

        record.lsn = core.next_lsn;
        core.next_lsn += 1;

        let offset = core.log_offset;
        record.serialize_into(&mut core.log_buffer[offset..offset + size]);
        core.log_offset += size;

        record.lsn
    }

    /// Synchronously flush the log: request a flush and wait for the flush
    /// thread to report completion. No-op when logging is off.
    pub fn flush(&self) {
        let inner = &*self.inner;
        if !inner.enable_logging.load(Ordering::SeqCst) {
            return;
        }

        let mut core = inner.core.lock();
        core.need_flush = true;
        inner.flush_cv.notify_one();

        while core.need_flush {
            inner.append_cv.wait(&mut core);
        }
    }
}
