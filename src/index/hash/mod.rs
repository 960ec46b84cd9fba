mod block_page;
mod header_page;
mod table;

pub use block_page::HashBlockPage;
pub use header_page::HashHeaderPage;
pub use table::{HashFn, KeyComparator, LinearProbeHashTable};

use byteorder::{ByteOrder, LittleEndian};
use crate::common::types::Rid;

/// Fixed-width wire encoding for keys and values stored in hash table
/// pages. Slot arithmetic depends on every entry having the same size.
pub trait FixedBytes: Copy + Default + PartialEq {
    const SIZE: usize;

    fn write_to(&self, buf: &mut [u8]);
    fn read_from(buf: &[u8]) -> Self;
}

impl FixedBytes for i32 {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn read_from(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl FixedBytes for u32 {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn read_from(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl FixedBytes for i64 {
    const SIZE: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn read_from(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl FixedBytes for u64 {
    const SIZE: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, *self);
    }

    fn read_from(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
}

impl FixedBytes for Rid {
    const SIZE: usize = Rid::SIZE;

    fn write_to(&self, buf: &mut [u8]) {
        Rid::write_to(self, buf)
    }

    fn read_from(buf: &[u8]) -> Self {
        Rid::read_from(buf)
    }
}
