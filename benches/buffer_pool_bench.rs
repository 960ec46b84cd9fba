use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

use std::sync::Arc;
use marrowdb::storage::buffer::BufferPoolManager;
use marrowdb::storage::disk::DiskManager;
use marrowdb::storage::page::PageManager;

// Create a buffer pool over temporary files that outlive the benchmark
fn create_bench_buffer_pool(pool_size: usize) -> Arc<BufferPoolManager> {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let log_file = tempfile::NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(db_file.path(), log_file.path()).unwrap());

    // Keep the temp files alive
    std::mem::forget(db_file);
    std::mem::forget(log_file);

    Arc::new(BufferPoolManager::new(pool_size, disk_manager))
}

fn generate_test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn setup_pages(buffer_pool: &Arc<BufferPoolManager>, count: usize) -> Vec<i32> {
    let page_manager = PageManager::new();
    let mut page_ids = Vec::new();

    for _ in 0..count {
        let (page, page_id) = buffer_pool.new_page().unwrap();
        {
            let mut page_guard = page.write();
            page_manager.init_page(&mut page_guard, None);
            let data = generate_test_data(100);
            page_manager.insert_record(&mut page_guard, &data).unwrap();
        }
        buffer_pool.unpin_page(page_id, true).unwrap();
        page_ids.push(page_id);
    }

    page_ids
}

fn buffer_pool_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("BufferPool");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("sequential_access", size), size, |b, &size| {
            let buffer_pool = create_bench_buffer_pool(size as usize);
            let page_ids = setup_pages(&buffer_pool, size as usize);

            b.iter(|| {
                for &page_id in &page_ids {
                    let page = buffer_pool.fetch_page(page_id).unwrap();
                    {
                        let _page_guard = page.read();
                    }
                    buffer_pool.unpin_page(page_id, false).unwrap();
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("random_access", size), size, |b, &size| {
            let buffer_pool = create_bench_buffer_pool(size as usize);
            let page_ids = setup_pages(&buffer_pool, size as usize);

            let mut rng = rand::thread_rng();
            let random_indices: Vec<usize> = (0..size as usize)
                .map(|_| rng.gen_range(0..size as usize))
                .collect();

            b.iter(|| {
                for &idx in &random_indices {
                    let page_id = page_ids[idx];
                    let page = buffer_pool.fetch_page(page_id).unwrap();
                    {
                        let _page_guard = page.read();
                    }
                    buffer_pool.unpin_page(page_id, false).unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, buffer_pool_benchmark);
criterion_main!(benches);
