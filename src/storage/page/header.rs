use byteorder::{ByteOrder, LittleEndian};
use crate::common::types::{Lsn, PageId, PAGE_SIZE, INVALID_PAGE_ID};
use crate::storage::page::layout::HEADER_SIZE;

/// In-page header. The lsn field is persisted here so the on-disk page LSN
/// survives restarts; recovery compares it against log record LSNs.
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub lsn: Lsn,
    pub free_space_offset: u32,
    pub free_space_size: u32,
    pub record_count: u32,
    pub next_page_id: Option<PageId>,
    pub prev_page_id: Option<PageId>,
}

impl Default for PageHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl PageHeader {
    pub fn new() -> Self {
        Self {
            lsn: 0,
            free_space_offset: HEADER_SIZE as u32,
            free_space_size: (PAGE_SIZE - HEADER_SIZE) as u32,
            record_count: 0,
            next_page_id: None,
            prev_page_id: None,
        }
    }

    // Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];

        LittleEndian::write_i32(&mut bytes[0..4], self.lsn);
        LittleEndian::write_u32(&mut bytes[4..8], self.free_space_offset);
        LittleEndian::write_u32(&mut bytes[8..12], self.free_space_size);
        LittleEndian::write_u32(&mut bytes[12..16], self.record_count);

        let next_id = self.next_page_id.unwrap_or(INVALID_PAGE_ID);
        LittleEndian::write_i32(&mut bytes[16..20], next_id);

        let prev_id = self.prev_page_id.unwrap_or(INVALID_PAGE_ID);
        LittleEndian::write_i32(&mut bytes[20..24], prev_id);

        bytes
    }

    // Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let lsn = LittleEndian::read_i32(&bytes[0..4]);
        let free_space_offset = LittleEndian::read_u32(&bytes[4..8]);
        let free_space_size = LittleEndian::read_u32(&bytes[8..12]);
        let record_count = LittleEndian::read_u32(&bytes[12..16]);

        let next_id = LittleEndian::read_i32(&bytes[16..20]);
        let next_page_id = if next_id == INVALID_PAGE_ID { None } else { Some(next_id) };

        let prev_id = LittleEndian::read_i32(&bytes[20..24]);
        let prev_page_id = if prev_id == INVALID_PAGE_ID { None } else { Some(prev_id) };

        Self {
            lsn,
            free_space_offset,
            free_space_size,
            record_count,
            next_page_id,
            prev_page_id,
        }
    }
}
