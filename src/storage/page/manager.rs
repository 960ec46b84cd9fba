use crate::common::types::{Lsn, Page, PageId, Rid, PAGE_SIZE};
use crate::storage::page::header::PageHeader;
use crate::storage::page::error::PageError;
use crate::storage::page::layout::{Slot, DELETE_MASK, HEADER_SIZE, SLOT_SIZE};

/// Stateless accessor for the slotted table-page layout.
///
/// Record data is stored from the beginning of the page (after the header);
/// slot entries are stored from the end of the page. Deleted records are
/// first marked (delete bit on the slot length, bytes kept for rollback) and
/// only physically removed by `apply_delete`.
pub struct PageManager {}

impl Default for PageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PageManager {
    pub fn new() -> Self {
        Self {}
    }

    /// Format `page` as an empty table page linked after `prev_page_id`.
    pub fn init_page(&self, page: &mut Page, prev_page_id: Option<PageId>) {
        let header = PageHeader {
            prev_page_id,
            ..PageHeader::new()
        };
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        page.lsn = 0;
    }

    /// Insert a record into the first fresh slot and return its RID.
    pub fn insert_record(&self, page: &mut Page, data: &[u8]) -> Result<Rid, PageError> {
        let mut header = self.get_header(page);

        // Record size plus the slot entry for the record
        let record_size = data.len() as u32;
        let total_space_needed = record_size + SLOT_SIZE as u32;

        if header.free_space_size < total_space_needed {
            return Err(PageError::InsufficientSpace);
        }

        let slot_num = header.record_count;
        let slot_pos = self.slot_position(slot_num);

        let slot = Slot {
            offset: header.free_space_offset,
            length: record_size,
        };

        // Write record data
        let data_end = header.free_space_offset as usize + data.len();
        page.data[header.free_space_offset as usize..data_end].copy_from_slice(data);

        // Write slot entry
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&slot.to_bytes());

        // Update header
        header.free_space_offset += record_size;
        header.free_space_size -= total_space_needed;
        header.record_count += 1;
        self.put_header(page, &header);

        Ok(Rid::new(page.page_id, slot_num))
    }

    /// Re-insert a record into an existing slot that was physically deleted.
    /// Used when rolling back an `apply_delete`.
    pub fn insert_record_at(&self, page: &mut Page, slot_num: u32, data: &[u8]) -> Result<(), PageError> {
        let mut header = self.get_header(page);

        if slot_num >= header.record_count {
            return Err(PageError::InvalidSlot);
        }

        let slot_pos = self.slot_position(slot_num);
        let slot = self.get_slot(page, slot_pos);

        if !slot.is_free() {
            return Err(PageError::DuplicateRecord);
        }

        let record_size = data.len() as u32;
        if header.free_space_size < record_size {
            return Err(PageError::InsufficientSpace);
        }

        // Write the record data at the current free space offset
        let data_end = header.free_space_offset as usize + data.len();
        page.data[header.free_space_offset as usize..data_end].copy_from_slice(data);

        let new_slot = Slot {
            offset: header.free_space_offset,
            length: record_size,
        };
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&new_slot.to_bytes());

        header.free_space_offset += record_size;
        header.free_space_size -= record_size;
        self.put_header(page, &header);

        Ok(())
    }

    pub fn get_record(&self, page: &Page, slot_num: u32) -> Result<Vec<u8>, PageError> {
        let header = self.get_header(page);

        if slot_num >= header.record_count {
            return Err(PageError::InvalidSlot);
        }

        let slot = self.get_slot(page, self.slot_position(slot_num));
        if slot.is_free() || slot.is_delete_marked() {
            return Err(PageError::RecordNotFound);
        }

        let start = slot.offset as usize;
        let end = start + slot.record_length() as usize;
        Ok(page.data[start..end].to_vec())
    }

    /// Overwrite the record in `slot_num` and return its previous bytes.
    pub fn update_record(&self, page: &mut Page, slot_num: u32, data: &[u8]) -> Result<Vec<u8>, PageError> {
        let mut header = self.get_header(page);

        if slot_num >= header.record_count {
            return Err(PageError::InvalidSlot);
        }

        let slot_pos = self.slot_position(slot_num);
        let slot = self.get_slot(page, slot_pos);
        if slot.is_free() || slot.is_delete_marked() {
            return Err(PageError::RecordNotFound);
        }

        let old_len = slot.record_length() as usize;
        let old_start = slot.offset as usize;
        let old_data = page.data[old_start..old_start + old_len].to_vec();

        let new_size = data.len() as u32;

        if new_size > slot.record_length() {
            // Larger record: relocate to the free space region, keeping the
            // same slot so the RID stays stable.
            let space_needed = new_size - slot.record_length();
            if header.free_space_size < space_needed {
                return Err(PageError::InsufficientSpace);
            }

            let new_offset = header.free_space_offset;
            let new_end = new_offset as usize + data.len();
            page.data[new_offset as usize..new_end].copy_from_slice(data);

            let new_slot = Slot {
                offset: new_offset,
                length: new_size,
            };
            page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&new_slot.to_bytes());

            header.free_space_offset += new_size;
            header.free_space_size -= space_needed;
            self.put_header(page, &header);

            return Ok(old_data);
        }

        // Smaller or equal: update in place
        page.data[old_start..old_start + data.len()].copy_from_slice(data);

        if new_size < slot.record_length() {
            let new_slot = Slot {
                offset: slot.offset,
                length: new_size,
            };
            page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&new_slot.to_bytes());
        }

        Ok(old_data)
    }

    /// Set the delete mark on a record. The bytes stay in place so the mark
    /// can be rolled back.
    pub fn mark_delete(&self, page: &mut Page, slot_num: u32) -> Result<(), PageError> {
        let header = self.get_header(page);

        if slot_num >= header.record_count {
            return Err(PageError::InvalidSlot);
        }

        let slot_pos = self.slot_position(slot_num);
        let mut slot = self.get_slot(page, slot_pos);
        if slot.is_free() {
            return Err(PageError::RecordNotFound);
        }

        slot.length |= DELETE_MASK;
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&slot.to_bytes());
        Ok(())
    }

    /// Clear the delete mark on a record.
    pub fn rollback_delete(&self, page: &mut Page, slot_num: u32) -> Result<(), PageError> {
        let header = self.get_header(page);

        if slot_num >= header.record_count {
            return Err(PageError::InvalidSlot);
        }

        let slot_pos = self.slot_position(slot_num);
        let mut slot = self.get_slot(page, slot_pos);
        if slot.is_free() {
            return Err(PageError::RecordNotFound);
        }

        slot.length &= !DELETE_MASK;
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&slot.to_bytes());
        Ok(())
    }

    /// Physically delete a record and return its bytes. The slot entry stays
    /// allocated (length 0); space is not reclaimed until the frame is
    /// reformatted.
    pub fn apply_delete(&self, page: &mut Page, slot_num: u32) -> Result<Vec<u8>, PageError> {
        let header = self.get_header(page);

        if slot_num >= header.record_count {
            return Err(PageError::InvalidSlot);
        }

        let slot_pos = self.slot_position(slot_num);
        let slot = self.get_slot(page, slot_pos);
        if slot.is_free() {
            return Err(PageError::RecordNotFound);
        }

        let start = slot.offset as usize;
        let end = start + slot.record_length() as usize;
        let old_data = page.data[start..end].to_vec();

        let freed = Slot { offset: 0, length: 0 };
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&freed.to_bytes());

        Ok(old_data)
    }

    pub fn get_lsn(&self, page: &Page) -> Lsn {
        self.get_header(page).lsn
    }

    /// Stamp the page with the LSN of the log record that modified it. The
    /// value is written into the header bytes so it persists with the page.
    pub fn set_lsn(&self, page: &mut Page, lsn: Lsn) {
        let mut header = self.get_header(page);
        header.lsn = lsn;
        self.put_header(page, &header);
        page.lsn = lsn;
    }

    pub fn next_page_id(&self, page: &Page) -> Option<PageId> {
        self.get_header(page).next_page_id
    }

    pub fn set_next_page_id(&self, page: &mut Page, next_page_id: Option<PageId>) {
        let mut header = self.get_header(page);
        header.next_page_id = next_page_id;
        self.put_header(page, &header);
    }

    pub fn prev_page_id(&self, page: &Page) -> Option<PageId> {
        self.get_header(page).prev_page_id
    }

    pub fn get_header(&self, page: &Page) -> PageHeader {
        PageHeader::from_bytes(&page.data[0..HEADER_SIZE])
    }

    pub fn get_free_space(&self, page: &Page) -> u32 {
        self.get_header(page).free_space_size
    }

    // Helper methods

    fn put_header(&self, page: &mut Page, header: &PageHeader) {
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    // Calculate slot position from the slot index
    fn slot_position(&self, slot_num: u32) -> usize {
        PAGE_SIZE - SLOT_SIZE * (slot_num as usize + 1)
    }

    fn get_slot(&self, page: &Page, slot_pos: usize) -> Slot {
        Slot::from_bytes(&page.data[slot_pos..slot_pos + SLOT_SIZE])
    }
}
