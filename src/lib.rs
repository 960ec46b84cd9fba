// Export public modules
pub mod common;
pub mod storage;
pub mod wal;
pub mod index;

// Re-export key items for convenient access
pub use storage::buffer::BufferPoolManager;
pub use storage::buffer::BufferPoolError;
pub use storage::buffer::ClockReplacer;
pub use storage::disk::DiskManager;
pub use storage::page::PageManager;
pub use storage::page::PageError;
pub use wal::log_manager::LogManager;
pub use wal::recovery::LogRecovery;
pub use index::hash::LinearProbeHashTable;
