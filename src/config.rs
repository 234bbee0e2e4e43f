//! # Engine Configuration
//!
//! This module centralizes the configuration surface of the engine. Constants
//! that depend on each other are co-located so a change to one is visible
//! next to the values it constrains.
//!
//! ```text
//! DEFAULT_PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> TABLE_HEADER_SIZE (32 bytes, page 0 only)
//!       │     The whole first page is reserved for the header; records
//!       │     start at byte offset page_size.
//!       │
//!       └─> a table schema is rejected when record_size > page_size
//!
//! DEFAULT_CACHE_PAGES (1024, total across all shards)
//!       │
//!       └─> split evenly per NUMA node; every shard keeps at least 1 page
//!
//! PAGE_LOCK_STRIPES (64)
//!       │
//!       └─> point operations lock stripe page_id % PAGE_LOCK_STRIPES
//! ```

use std::path::{Path, PathBuf};

/// Default size of a database page in bytes. The unit of I/O and caching.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default total page-cache capacity, split across the NUMA shards.
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Size of the table file header. The remainder of page 0 is zero.
pub const TABLE_HEADER_SIZE: usize = 32;

/// Number of page-lock stripes per table.
/// More stripes reduce contention between point operations on distinct pages.
pub const PAGE_LOCK_STRIPES: usize = 64;

/// File name of the persisted catalog inside the database directory.
pub const CATALOG_FILE_NAME: &str = "catalog.meta";

/// File name of the redo log inside the database directory.
pub const LOG_FILE_NAME: &str = "db.log";

/// Extension of per-table data files.
pub const TABLE_FILE_EXTENSION: &str = "tbl";

/// Configuration for opening a [`crate::Database`].
///
/// `numa_nodes = 0` lets the NUMA layer pick the node count (environment
/// override or single-node fallback).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub base_dir: PathBuf,
    pub page_size: usize,
    pub cache_pages: usize,
    pub numa_nodes: usize,
    pub threads_per_node: usize,
    /// Checkpoint after every mutating statement. Bounds recovery time at the
    /// cost of a full flush per write; the log stays truncatable at any time
    /// after all tables flush regardless of this setting.
    pub auto_checkpoint: bool,
}

impl DatabaseConfig {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            page_size: DEFAULT_PAGE_SIZE,
            cache_pages: DEFAULT_CACHE_PAGES,
            numa_nodes: 0,
            threads_per_node: 1,
            auto_checkpoint: true,
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn cache_pages(mut self, cache_pages: usize) -> Self {
        self.cache_pages = cache_pages;
        self
    }

    pub fn numa_nodes(mut self, numa_nodes: usize) -> Self {
        self.numa_nodes = numa_nodes;
        self
    }

    pub fn threads_per_node(mut self, threads_per_node: usize) -> Self {
        self.threads_per_node = threads_per_node.max(1);
        self
    }

    pub fn auto_checkpoint(mut self, enabled: bool) -> Self {
        self.auto_checkpoint = enabled;
        self
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.base_dir.join(CATALOG_FILE_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join(LOG_FILE_NAME)
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.{}", name, TABLE_FILE_EXTENSION))
    }
}
