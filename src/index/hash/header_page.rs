use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, PAGE_SIZE};
use crate::storage::page::layout::HEADER_SIZE;

const NUM_BUCKETS_OFFSET: usize = HEADER_SIZE;
const NUM_BLOCKS_OFFSET: usize = HEADER_SIZE + 4;
const BLOCK_IDS_OFFSET: usize = HEADER_SIZE + 8;

/// Accessor for the hash table's directory page: the overall bucket count
/// plus the ordered list of block page ids.
pub struct HashHeaderPage;

impl Default for HashHeaderPage {
    fn default() -> Self {
        Self::new()
    }
}

impl HashHeaderPage {
    pub fn new() -> Self {
        Self
    }

    /// Most block page ids one directory page can hold.
    pub fn max_blocks(&self) -> usize {
        (PAGE_SIZE - BLOCK_IDS_OFFSET) / 4
    }

    pub fn init(&self, page: &mut Page, num_buckets: usize) {
        page.data[HEADER_SIZE..].fill(0);
        LittleEndian::write_u32(
            &mut page.data[NUM_BUCKETS_OFFSET..NUM_BUCKETS_OFFSET + 4],
            num_buckets as u32,
        );
    }

    pub fn num_buckets(&self, page: &Page) -> usize {
        LittleEndian::read_u32(&page.data[NUM_BUCKETS_OFFSET..NUM_BUCKETS_OFFSET + 4]) as usize
    }

    pub fn num_blocks(&self, page: &Page) -> usize {
        LittleEndian::read_u32(&page.data[NUM_BLOCKS_OFFSET..NUM_BLOCKS_OFFSET + 4]) as usize
    }

    pub fn add_block_page_id(&self, page: &mut Page, block_page_id: PageId) {
        let index = self.num_blocks(page);
        debug_assert!(index < self.max_blocks());

        let offset = BLOCK_IDS_OFFSET + index * 4;
        LittleEndian::write_i32(&mut page.data[offset..offset + 4], block_page_id);
        LittleEndian::write_u32(
            &mut page.data[NUM_BLOCKS_OFFSET..NUM_BLOCKS_OFFSET + 4],
            (index + 1) as u32,
        );
    }

    pub fn block_page_id(&self, page: &Page, index: usize) -> PageId {
        debug_assert!(index < self.num_blocks(page));
        let offset = BLOCK_IDS_OFFSET + index * 4;
        LittleEndian::read_i32(&page.data[offset..offset + 4])
    }
}
