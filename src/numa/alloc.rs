//! Node-bound buffer allocation.
//!
//! Page buffers are allocated through a [`NumaAllocator`] so that each cache
//! shard can place its pages on the node it is bound to. The system fallback
//! is a plain heap allocation tagged with the node it was requested for;
//! `MINI_DB_NUMA_ALLOC_NODE` can pin the tag to one node when NUMA-aware
//! allocation is disabled.

use std::sync::Arc;

use super::NumaOptions;

/// A zero-initialized page buffer that remembers which node it belongs to.
pub struct NodeBuffer {
    data: Box<[u8]>,
    node: usize,
}

impl NodeBuffer {
    pub fn new(size: usize, node: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
            node,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn node(&self) -> usize {
        self.node
    }

    pub fn zero(&mut self) {
        self.data.fill(0);
    }
}

pub trait NumaAllocator: Send + Sync {
    /// Allocates a zeroed buffer of `size` bytes, placed on `node` when the
    /// platform supports it.
    fn allocate(&self, size: usize, node: usize) -> NodeBuffer;
}

/// Heap allocator fallback. Honors the forced-node override so cache
/// accounting stays meaningful when NUMA placement is disabled.
struct SystemAllocator {
    forced_node: Option<usize>,
}

impl NumaAllocator for SystemAllocator {
    fn allocate(&self, size: usize, node: usize) -> NodeBuffer {
        NodeBuffer::new(size, self.forced_node.unwrap_or(node))
    }
}

pub fn system_allocator(options: &NumaOptions) -> Arc<dyn NumaAllocator> {
    let forced_node = if options.enabled {
        None
    } else {
        options.forced_alloc_node
    };
    Arc::new(SystemAllocator { forced_node })
}
