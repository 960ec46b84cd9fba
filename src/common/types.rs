use std::sync::Arc;
use parking_lot::RwLock;
use byteorder::{ByteOrder, LittleEndian};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Size of the in-memory log buffers, in bytes
pub const LOG_BUFFER_SIZE: usize = 16 * PAGE_SIZE;

/// Page ID type; -1 marks an invalid page
pub type PageId = i32;

/// Transaction ID type
pub type TxnId = i32;

/// Buffer pool frame index type
pub type FrameId = usize;

/// LSN (Log Sequence Number) type; -1 marks an unassigned LSN
pub type Lsn = i32;

pub const INVALID_PAGE_ID: PageId = -1;
pub const INVALID_TXN_ID: TxnId = -1;
pub const INVALID_LSN: Lsn = -1;

/// Record identifier: the page a record lives on plus its slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rid {
    pub page_id: PageId,
    pub slot_num: u32,
}

impl Rid {
    /// Serialized width: page id (4) + slot number (4)
    pub const SIZE: usize = 8;

    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Self { page_id, slot_num }
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(&mut buf[0..4], self.page_id);
        LittleEndian::write_u32(&mut buf[4..8], self.slot_num);
    }

    pub fn read_from(buf: &[u8]) -> Self {
        Self {
            page_id: LittleEndian::read_i32(&buf[0..4]),
            slot_num: LittleEndian::read_u32(&buf[4..8]),
        }
    }
}

/// Page structure: one disk page's contents plus its identity and the
/// highest LSN that has modified it (0 if none).
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
    pub lsn: Lsn,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
            lsn: 0,
        }
    }
}

/// Smart pointer to a page; the RwLock is the page latch.
pub type PagePtr = Arc<RwLock<Page>>;
