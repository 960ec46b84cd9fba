use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::RwLock;

use crate::common::types::{FrameId, Lsn, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::ClockReplacer;
use crate::storage::disk::DiskManager;
use crate::wal::log_manager::LogManager;

/// One slot of the frame array. The page contents live behind the page
/// latch; pin count and dirty bit are pool metadata guarded by the pool
/// latch. The dirty bit is atomic so `flush_page` can clear it while holding
/// only the reader latch.
struct Frame {
    page: PagePtr,
    pin_count: u32,
    is_dirty: AtomicBool,
}

struct PoolInner {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// The central paged cache. Owns the frame array, the page table and the
/// free list under a single pool-wide latch, and coordinates with the clock
/// replacer and (when logging is enabled) the log manager.
///
/// Invariants maintained here:
/// - a valid page id occupies at most one frame;
/// - a frame is in exactly one of free list / replacer / pinned;
/// - no dirty page is written back before the log is durable through its LSN.
pub struct BufferPoolManager {
    pool_size: usize,
    inner: RwLock<PoolInner>,
    replacer: ClockReplacer,
    disk_manager: Arc<DiskManager>,
    log_manager: Option<Arc<LogManager>>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_log_manager(pool_size, disk_manager, None)
    }

    /// Build a pool with write-ahead logging wired in. Logging is an
    /// explicit construction choice, not process-wide state.
    pub fn with_log_manager(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        // Initially, every frame is in the free list.
        for frame_id in 0..pool_size {
            frames.push(Frame {
                page: Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID))),
                pin_count: 0,
                is_dirty: AtomicBool::new(false),
            });
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            inner: RwLock::new(PoolInner {
                frames,
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: ClockReplacer::new(pool_size),
            disk_manager,
            log_manager,
        }
    }

    /// Fetch a page, reading it from disk if it is not resident. The page
    /// comes back pinned; the caller must `unpin_page` exactly once.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation(
                "Cannot fetch invalid page ID".to_string(),
            ));
        }

        let mut inner = self.inner.write();

        // Already resident: pin it and return immediately.
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &mut inner.frames[frame_id];
            frame.pin_count += 1;
            if frame.pin_count == 1 {
                self.replacer.pin(frame_id);
            }
            return Ok(frame.page.clone());
        }

        // Not resident: take a frame from the free list or evict a victim.
        let frame_id = self.get_victim_frame(&mut inner)?;

        // Write the victim's old page back if it is dirty. The WAL hook in
        // get_victim_frame already made the log durable through its LSN.
        let old_page_id = self.write_back_if_dirty(&inner.frames[frame_id])?;

        if old_page_id != INVALID_PAGE_ID {
            inner.page_table.remove(&old_page_id);
        }
        inner.page_table.insert(page_id, frame_id);

        {
            let frame = &mut inner.frames[frame_id];
            {
                let mut page = frame.page.write();
                self.disk_manager.read_page(page_id, &mut page)?;
            }
            frame.pin_count = 1;
            frame.is_dirty.store(false, Ordering::SeqCst);
        }
        self.replacer.pin(frame_id);

        Ok(inner.frames[frame_id].page.clone())
    }

    /// Create a brand-new page. The frame is zeroed and comes back pinned
    /// and dirty so the fresh page reaches disk even if never written to.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut inner = self.inner.write();

        if inner.free_list.is_empty() && self.replacer.size() == 0 {
            return Err(BufferPoolError::BufferPoolFull);
        }

        let frame_id = self.get_victim_frame(&mut inner)?;
        let old_page_id = self.write_back_if_dirty(&inner.frames[frame_id])?;

        let page_id = self.disk_manager.allocate_page();

        if old_page_id != INVALID_PAGE_ID {
            inner.page_table.remove(&old_page_id);
        }
        inner.page_table.insert(page_id, frame_id);

        {
            let frame = &mut inner.frames[frame_id];
            {
                let mut page = frame.page.write();
                *page = Page::new(page_id);
            }
            frame.pin_count = 1;
            frame.is_dirty.store(true, Ordering::SeqCst);
        }
        self.replacer.pin(frame_id);

        Ok((inner.frames[frame_id].page.clone(), page_id))
    }

    /// Release one pin on a page, recording whether the caller dirtied it.
    /// The dirty bit is only ever set here, never cleared.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut inner = self.inner.write();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotFound(page_id)),
        };

        let frame = &mut inner.frames[frame_id];
        if frame.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }

        if is_dirty {
            frame.is_dirty.store(true, Ordering::SeqCst);
        }

        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Write a resident page to disk if dirty. Only needs the reader latch:
    /// nothing pool-visible changes beyond the dirty bit.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let inner = self.inner.read();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotFound(page_id)),
        };

        let frame = &inner.frames[frame_id];
        if frame.is_dirty.load(Ordering::SeqCst) {
            let page = frame.page.read();
            self.wal_barrier(page.lsn);
            self.disk_manager.write_page(&page)?;
            frame.is_dirty.store(false, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Write every dirty resident page to disk.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let inner = self.inner.write();

        for frame in &inner.frames {
            if !frame.is_dirty.load(Ordering::SeqCst) {
                continue;
            }
            let page = frame.page.read();
            if page.page_id == INVALID_PAGE_ID {
                continue;
            }
            self.wal_barrier(page.lsn);
            self.disk_manager.write_page(&page)?;
            frame.is_dirty.store(false, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Drop a page from the pool and return its frame to the free list.
    /// Deleting a non-resident page is a no-op; deleting a pinned page is
    /// refused.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut inner = self.inner.write();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Ok(()),
        };

        if inner.frames[frame_id].pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        self.disk_manager.deallocate_page(page_id);
        inner.page_table.remove(&page_id);

        {
            let frame = &mut inner.frames[frame_id];
            {
                let mut page = frame.page.write();
                *page = Page::new(INVALID_PAGE_ID);
            }
            frame.pin_count = 0;
            frame.is_dirty.store(false, Ordering::SeqCst);
        }

        self.replacer.pin(frame_id);
        inner.free_list.push_back(frame_id);

        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Current pin count of a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.inner.read();
        let &frame_id = inner.page_table.get(&page_id)?;
        Some(inner.frames[frame_id].pin_count)
    }

    /// Current dirty bit of a resident page.
    pub fn is_page_dirty(&self, page_id: PageId) -> Option<bool> {
        let inner = self.inner.read();
        let &frame_id = inner.page_table.get(&page_id)?;
        Some(inner.frames[frame_id].is_dirty.load(Ordering::SeqCst))
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Take a frame from the free list, or else a victim from the replacer.
    /// Before a dirty replacer victim can be written back, the log must be
    /// durable through the victim page's LSN; that is enforced here and
    /// nowhere else on the eviction path.
    fn get_victim_frame(&self, inner: &mut PoolInner) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = match self.replacer.victim() {
            Some(id) => id,
            None => return Err(BufferPoolError::BufferPoolFull),
        };

        if inner.frames[frame_id].is_dirty.load(Ordering::SeqCst) {
            let lsn = inner.frames[frame_id].page.read().lsn;
            self.wal_barrier(lsn);
        }

        Ok(frame_id)
    }

    /// Force the log durable through `lsn` before a page write may proceed.
    fn wal_barrier(&self, lsn: Lsn) {
        if let Some(log_manager) = &self.log_manager {
            if lsn > log_manager.persistent_lsn() {
                log_manager.flush();
            }
        }
    }

    /// Write the frame's current page to disk if it is dirty. Returns the
    /// page id the frame held, valid or not.
    fn write_back_if_dirty(&self, frame: &Frame) -> Result<PageId, BufferPoolError> {
        let page = frame.page.read();
        if page.page_id != INVALID_PAGE_ID && frame.is_dirty.load(Ordering::SeqCst) {
            self.disk_manager.write_page(&page)?;
        }
        Ok(page.page_id)
    }
}
