//! # Storage Module
//!
//! The storage layer turns one flat file into a cached, NUMA-sharded page
//! space, and carries the redo log that makes mutations recoverable.
//!
//! ## Architecture Overview
//!
//! ```text
//! PagedFile::read_item / write_item        (byte ranges)
//!        │
//!        ▼
//! NumaBufferPool ── selector: page_id % nodes
//!        │
//!        ├── PageCache shard 0 (node 0, LRU, dirty tracking)
//!        ├── PageCache shard 1 (node 1, ...)
//!        │        │ miss / write-back
//!        ▼        ▼
//!            Pager (single mutex, the only owner of the file handle)
//! ```
//!
//! Every page belongs to exactly one shard, fixed by the selector. A shard
//! allocates its buffers through the node-bound allocator, so a page's
//! memory lives on the node that the executor routes its operations to.
//!
//! ## Page Access Discipline
//!
//! Shards never hand out page pointers. [`PageCache::with_page`] runs a
//! closure under the shard mutex, which makes it impossible for a page
//! reference to outlive its critical section; eviction and access are
//! therefore linearizable per shard without pin counting.
//!
//! ## Write-Ahead Ordering
//!
//! [`LogManager::append`] flushes the log line to disk before returning.
//! Callers append the redo record first and only then mutate the cached
//! page, so any state change that could survive a crash is preceded by its
//! log entry.

mod cache;
mod paged_file;
mod pager;
mod pool;
mod wal;

pub use cache::{Page, PageCache};
pub use paged_file::PagedFile;
pub use pager::Pager;
pub use pool::{ModuloSelector, NumaBufferPool, PageNodeSelector};
pub use wal::{LogEntry, LogManager, LogOp};
