use std::cmp::Ordering;
use std::sync::Arc;
use log::debug;
use parking_lot::RwLock;

use crate::common::types::{Page, PageId};
use crate::index::hash::{FixedBytes, HashBlockPage, HashHeaderPage};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};

/// Comparator supplied at construction; equality is `Ordering::Equal`.
pub type KeyComparator<K> = Box<dyn Fn(&K, &K) -> Ordering + Send + Sync>;

/// Hash function supplied at construction.
pub type HashFn<K> = Box<dyn Fn(&K) -> u64 + Send + Sync>;

/// Table layout. Guarded by the table latch: probes take it in read mode,
/// `resize` in write mode.
#[derive(Debug, Clone, Copy)]
struct TableMeta {
    header_page_id: PageId,
    num_buckets: usize,
    num_pages: usize,
    last_block_array_size: usize,
}

enum ProbeOutcome {
    Inserted,
    Duplicate,
    Full,
}

/// Disk-backed linear-probing hash table built on the buffer pool.
///
/// `slot = hash(key) % num_buckets`; a probe walks forward one slot at a
/// time, crossing block pages and wrapping at `num_buckets`, until it hits a
/// never-occupied slot or returns to where it started. Block pages are
/// latched one at a time, always after the table latch.
pub struct LinearProbeHashTable<K: FixedBytes, V: FixedBytes> {
    name: String,
    buffer_pool: Arc<BufferPoolManager>,
    meta: RwLock<TableMeta>,
    comparator: KeyComparator<K>,
    hash_fn: HashFn<K>,
    header: HashHeaderPage,
    block: HashBlockPage<K, V>,
}

impl<K: FixedBytes, V: FixedBytes> LinearProbeHashTable<K, V> {
    pub fn new(
        name: impl Into<String>,
        buffer_pool: Arc<BufferPoolManager>,
        comparator: KeyComparator<K>,
        num_buckets: usize,
        hash_fn: HashFn<K>,
    ) -> Result<Self, BufferPoolError> {
        assert!(num_buckets > 0, "hash table needs at least one bucket");

        let table = Self {
            name: name.into(),
            buffer_pool,
            meta: RwLock::new(TableMeta {
                header_page_id: -1,
                num_buckets: 0,
                num_pages: 0,
                last_block_array_size: 0,
            }),
            comparator,
            hash_fn,
            header: HashHeaderPage::new(),
            block: HashBlockPage::new(),
        };

        let meta = table.build_layout(num_buckets)?;
        *table.meta.write() = meta;

        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_buckets(&self) -> usize {
        self.meta.read().num_buckets
    }

    /// Collect every value stored under `key`.
    pub fn lookup(&self, key: &K) -> Result<Vec<V>, BufferPoolError> {
        let meta = self.meta.read();
        let header_ptr = self.buffer_pool.fetch_page(meta.header_page_id)?;

        let mut result = Vec::new();
        {
            let header = header_ptr.read();
            let capacity = self.block.capacity();

            let mut slot = self.home_slot(&meta, key);
            let mut remaining = meta.num_buckets;
            let mut done = false;

            while remaining > 0 && !done {
                let block_index = slot / capacity;
                let block_page_id = self.header.block_page_id(&header, block_index);
                let block_ptr = self.buffer_pool.fetch_page(block_page_id)?;
                {
                    let block = block_ptr.read();
                    while remaining > 0 {
                        let bucket = slot % capacity;
                        if !self.block.is_occupied(&block, bucket) {
                            done = true;
                            break;
                        }
                        if self.block.is_readable(&block, bucket)
                            && (self.comparator)(key, &self.block.key_at(&block, bucket))
                                == Ordering::Equal
                        {
                            result.push(self.block.value_at(&block, bucket));
                        }
                        slot = (slot + 1) % meta.num_buckets;
                        remaining -= 1;
                        if slot / capacity != block_index {
                            break;
                        }
                    }
                }
                self.buffer_pool.unpin_page(block_page_id, false)?;
            }
        }

        self.buffer_pool.unpin_page(meta.header_page_id, false)?;
        Ok(result)
    }

    /// Insert a (key, value) pair. Returns `false` if the exact pair is
    /// already present. A full probe cycle triggers a resize and a retry.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool, BufferPoolError> {
        loop {
            let (outcome, num_buckets) = {
                let meta = self.meta.read();
                let header_ptr = self.buffer_pool.fetch_page(meta.header_page_id)?;
                let outcome = {
                    let header = header_ptr.read();
                    self.insert_probe(&meta, &header, key, value)?
                };
                self.buffer_pool.unpin_page(meta.header_page_id, false)?;
                (outcome, meta.num_buckets)
            };

            match outcome {
                ProbeOutcome::Inserted => return Ok(true),
                ProbeOutcome::Duplicate => return Ok(false),
                ProbeOutcome::Full => self.resize(num_buckets)?,
            }
        }
    }

    /// Remove an exact (key, value) pair, tombstoning its slot. Returns
    /// `false` if the pair is not live in the table.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool, BufferPoolError> {
        let meta = self.meta.read();
        let header_ptr = self.buffer_pool.fetch_page(meta.header_page_id)?;

        let mut removed = false;
        {
            let header = header_ptr.read();
            let capacity = self.block.capacity();

            let mut slot = self.home_slot(&meta, key);
            let mut remaining = meta.num_buckets;
            let mut done = false;

            while remaining > 0 && !done {
                let block_index = slot / capacity;
                let block_page_id = self.header.block_page_id(&header, block_index);
                let block_ptr = self.buffer_pool.fetch_page(block_page_id)?;
                let mut dirty = false;
                {
                    let mut block = block_ptr.write();
                    while remaining > 0 {
                        let bucket = slot % capacity;
                        if !self.block.is_occupied(&block, bucket) {
                            done = true;
                            break;
                        }
                        if (self.comparator)(key, &self.block.key_at(&block, bucket))
                            == Ordering::Equal
                            && self.block.value_at(&block, bucket) == *value
                        {
                            // A tombstone of the same pair means it is gone.
                            if self.block.is_readable(&block, bucket) {
                                self.block.remove(&mut block, bucket);
                                dirty = true;
                                removed = true;
                            }
                            done = true;
                            break;
                        }
                        slot = (slot + 1) % meta.num_buckets;
                        remaining -= 1;
                        if slot / capacity != block_index {
                            break;
                        }
                    }
                }
                self.buffer_pool.unpin_page(block_page_id, dirty)?;
            }
        }

        self.buffer_pool.unpin_page(meta.header_page_id, false)?;
        Ok(removed)
    }

    /// Grow the table to `2 * initial_size` buckets, reinserting every live
    /// entry and dropping tombstones, then delete the old pages.
    pub fn resize(&self, initial_size: usize) -> Result<(), BufferPoolError> {
        let mut meta = self.meta.write();
        if meta.num_buckets > initial_size {
            // Another thread already grew the table past this request.
            return Ok(());
        }

        let mut target_buckets = 2 * initial_size;
        loop {
            debug!("hash table {}: resizing to {} buckets", self.name, target_buckets);
            let new_meta = self.build_layout(target_buckets)?;

            if self.copy_entries(&meta, &new_meta)? {
                self.delete_layout(&meta)?;
                *meta = new_meta;
                return Ok(());
            }

            // The rebuilt table filled up before every entry fit. Capacity
            // grows strictly, so this terminates.
            self.delete_layout(&new_meta)?;
            target_buckets *= 2;
        }
    }

    /// Allocate and initialize a fresh header page and its block pages.
    fn build_layout(&self, num_buckets: usize) -> Result<TableMeta, BufferPoolError> {
        let capacity = self.block.capacity();
        let num_pages = (num_buckets + capacity - 1) / capacity;
        let last_block_array_size = num_buckets - (num_pages - 1) * capacity;
        assert!(
            num_pages <= self.header.max_blocks(),
            "hash table would overflow its directory page"
        );

        let (header_ptr, header_page_id) = self.buffer_pool.new_page()?;
        {
            let mut header = header_ptr.write();
            self.header.init(&mut header, num_buckets);

            for _ in 0..num_pages {
                let (_, block_page_id) = self.buffer_pool.new_page()?;
                self.buffer_pool.unpin_page(block_page_id, false)?;
                self.header.add_block_page_id(&mut header, block_page_id);
            }
        }
        self.buffer_pool.unpin_page(header_page_id, true)?;

        Ok(TableMeta {
            header_page_id,
            num_buckets,
            num_pages,
            last_block_array_size,
        })
    }

    /// Reinsert all readable entries of `old` into `new`. Returns `false`
    /// if `new` ran out of room.
    fn copy_entries(&self, old: &TableMeta, new: &TableMeta) -> Result<bool, BufferPoolError> {
        let old_header_ptr = self.buffer_pool.fetch_page(old.header_page_id)?;
        let new_header_ptr = self.buffer_pool.fetch_page(new.header_page_id)?;

        let mut fits = true;
        {
            let old_header = old_header_ptr.read();
            let new_header = new_header_ptr.read();

            'copy: for block_index in 0..old.num_pages {
                let block_page_id = self.header.block_page_id(&old_header, block_index);
                let block_ptr = self.buffer_pool.fetch_page(block_page_id)?;
                {
                    let block = block_ptr.read();
                    for bucket in 0..self.block_array_size(old, block_index) {
                        if !self.block.is_readable(&block, bucket) {
                            continue;
                        }
                        let key = self.block.key_at(&block, bucket);
                        let value = self.block.value_at(&block, bucket);
                        if matches!(
                            self.insert_probe(new, &new_header, &key, &value)?,
                            ProbeOutcome::Full
                        ) {
                            fits = false;
                            self.buffer_pool.unpin_page(block_page_id, false)?;
                            break 'copy;
                        }
                    }
                }
                self.buffer_pool.unpin_page(block_page_id, false)?;
            }
        }

        self.buffer_pool.unpin_page(new.header_page_id, false)?;
        self.buffer_pool.unpin_page(old.header_page_id, false)?;
        Ok(fits)
    }

    /// Delete a layout's block pages and header page.
    fn delete_layout(&self, meta: &TableMeta) -> Result<(), BufferPoolError> {
        let header_ptr = self.buffer_pool.fetch_page(meta.header_page_id)?;
        let block_ids: Vec<PageId> = {
            let header = header_ptr.read();
            (0..meta.num_pages)
                .map(|index| self.header.block_page_id(&header, index))
                .collect()
        };
        self.buffer_pool.unpin_page(meta.header_page_id, false)?;

        for block_page_id in block_ids {
            self.buffer_pool.delete_page(block_page_id)?;
        }
        self.buffer_pool.delete_page(meta.header_page_id)?;
        Ok(())
    }

    /// Probe-and-insert against an explicit layout; shared by `insert` and
    /// the resize copy loop.
    fn insert_probe(
        &self,
        meta: &TableMeta,
        header: &Page,
        key: &K,
        value: &V,
    ) -> Result<ProbeOutcome, BufferPoolError> {
        let capacity = self.block.capacity();

        let mut slot = self.home_slot(meta, key);
        let mut remaining = meta.num_buckets;

        while remaining > 0 {
            let block_index = slot / capacity;
            let block_page_id = self.header.block_page_id(header, block_index);
            let block_ptr = self.buffer_pool.fetch_page(block_page_id)?;
            let mut dirty = false;
            let mut outcome = None;
            {
                let mut block = block_ptr.write();
                while remaining > 0 {
                    let bucket = slot % capacity;
                    if self.block.insert(&mut block, bucket, key, value) {
                        dirty = true;
                        outcome = Some(ProbeOutcome::Inserted);
                        break;
                    }
                    // The slot holds a live entry; an identical pair is a
                    // duplicate, anything else just lengthens the probe.
                    if (self.comparator)(key, &self.block.key_at(&block, bucket))
                        == Ordering::Equal
                        && self.block.value_at(&block, bucket) == *value
                    {
                        outcome = Some(ProbeOutcome::Duplicate);
                        break;
                    }
                    slot = (slot + 1) % meta.num_buckets;
                    remaining -= 1;
                    if slot / capacity != block_index {
                        break;
                    }
                }
            }
            self.buffer_pool.unpin_page(block_page_id, dirty)?;

            if let Some(outcome) = outcome {
                return Ok(outcome);
            }
        }

        Ok(ProbeOutcome::Full)
    }

    fn home_slot(&self, meta: &TableMeta, key: &K) -> usize {
        ((self.hash_fn)(key) % meta.num_buckets as u64) as usize
    }

    /// Slots in use on the given block page; only the last one is partial.
    fn block_array_size(&self, meta: &TableMeta, block_index: usize) -> usize {
        if block_index + 1 == meta.num_pages {
            meta.last_block_array_size
        } else {
            self.block.capacity()
        }
    }
}
