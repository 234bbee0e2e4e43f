//! # NUMA Buffer Pool
//!
//! The buffer pool owns one [`PageCache`] shard per NUMA node and routes
//! every page operation to the shard that owns the page. Ownership is a pure
//! function of the page id, so a page's cache entry, its buffer memory, and
//! the executor queue working on it all land on the same node.
//!
//! Partitioning by page id also removes cross-node contention: each shard
//! has its own mutex, and two threads touching pages of different nodes
//! never serialize against each other.

use std::sync::Arc;

use eyre::Result;

use crate::numa::{detect_topology, system_allocator, NumaOptions, NumaTopology};
use crate::storage::{Page, PageCache, Pager};

/// Maps a page id to the node that owns it.
pub trait PageNodeSelector: Send + Sync {
    fn node_for_page(&self, page_id: u64, node_count: usize) -> usize;
}

/// Default policy: `page_id % node_count`.
pub struct ModuloSelector;

impl PageNodeSelector for ModuloSelector {
    fn node_for_page(&self, page_id: u64, node_count: usize) -> usize {
        if node_count == 0 {
            return 0;
        }
        (page_id % node_count as u64) as usize
    }
}

pub struct NumaBufferPool {
    topology: Arc<dyn NumaTopology>,
    selector: Box<dyn PageNodeSelector>,
    shards: Vec<PageCache>,
}

impl NumaBufferPool {
    /// Splits `capacity` evenly across the topology's nodes; every shard
    /// keeps at least one page.
    pub fn new(
        pager: Arc<Pager>,
        capacity: usize,
        page_size: usize,
        preferred_nodes: usize,
        options: &NumaOptions,
    ) -> Self {
        let topology = detect_topology(preferred_nodes, options);
        let allocator = system_allocator(options);
        let nodes = topology.node_count().max(1);
        let per_node = (capacity / nodes).max(1);

        let shards = (0..nodes)
            .map(|node| {
                PageCache::new(
                    Arc::clone(&pager),
                    per_node,
                    page_size,
                    node,
                    Arc::clone(&allocator),
                )
            })
            .collect();

        Self {
            topology,
            selector: Box::new(ModuloSelector),
            shards,
        }
    }

    pub fn node_count(&self) -> usize {
        self.shards.len()
    }

    pub fn topology(&self) -> &Arc<dyn NumaTopology> {
        &self.topology
    }

    /// The node owning `page_id` under this pool's selector.
    pub fn node_for_page(&self, page_id: u64) -> usize {
        let node = self.selector.node_for_page(page_id, self.shards.len());
        node % self.shards.len()
    }

    fn shard_for_page(&self, page_id: u64) -> &PageCache {
        &self.shards[self.node_for_page(page_id)]
    }

    pub fn with_page<R>(&self, page_id: u64, f: impl FnOnce(&mut Page) -> R) -> Result<R> {
        self.shard_for_page(page_id).with_page(page_id, f)
    }

    pub fn mark_dirty(&self, page_id: u64) {
        self.shard_for_page(page_id).mark_dirty(page_id);
    }

    /// Flushes every shard's dirty pages. Stops at the first failure.
    pub fn flush(&self) -> Result<()> {
        for shard in &self.shards {
            shard.flush()?;
        }
        Ok(())
    }

    pub fn cached_pages_per_node(&self) -> Vec<usize> {
        self.shards.iter().map(PageCache::page_count).collect()
    }

    pub fn dirty_pages_per_node(&self) -> Vec<usize> {
        self.shards.iter().map(PageCache::dirty_count).collect()
    }
}
