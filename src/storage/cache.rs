//! # LRU Page Cache Shard
//!
//! One `PageCache` is a strict-LRU cache of pages bound to a single NUMA
//! node. The buffer pool creates one shard per node and routes pages by the
//! selector, so a shard never sees a page that belongs to another node.
//!
//! ## Eviction
//!
//! The LRU order is an index-linked list over a slab of entries: a hit
//! splices the entry to the front in O(1), eviction takes the tail. A dirty
//! victim is written back through the pager before it leaves the cache; if
//! that write fails the whole `with_page` call fails and the cache is left
//! exactly as it was (minus the attempted write).
//!
//! ## Access Discipline
//!
//! Callers get at page bytes only through [`PageCache::with_page`], which
//! runs a closure while the shard mutex is held. No page reference can
//! escape the critical section, so eviction never invalidates memory some
//! other thread is still reading.

use std::collections::HashMap;
use std::sync::Arc;

use eyre::Result;
use parking_lot::Mutex;

use crate::numa::{NodeBuffer, NumaAllocator};
use crate::storage::Pager;

/// A cached page: identity, node-bound buffer, and dirty flag.
pub struct Page {
    id: u64,
    buffer: NodeBuffer,
    dirty: bool,
}

impl Page {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn node(&self) -> usize {
        self.buffer.node()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn data(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut_slice()
    }
}

struct Entry {
    page: Page,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU state: slab + index + intrusive list. `head` is most recent.
struct CacheInner {
    slots: Vec<Option<Entry>>,
    index: HashMap<u64, usize>,
    free_slots: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl CacheInner {
    fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            free_slots: Vec::new(),
            head: None,
            tail: None,
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.slots[idx] {
            Some(entry) => (entry.prev, entry.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(entry) = self.slots[p].as_mut() {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(entry) = self.slots[n].as_mut() {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(entry) = self.slots[idx].as_mut() {
            entry.prev = None;
            entry.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        if let Some(entry) = self.slots[idx].as_mut() {
            entry.prev = None;
            entry.next = self.head;
        }
        if let Some(old_head) = self.head {
            if let Some(entry) = self.slots[old_head].as_mut() {
                entry.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn insert_front(&mut self, page: Page) -> usize {
        let page_id = page.id;
        let entry = Entry {
            page,
            prev: None,
            next: None,
        };
        let idx = match self.free_slots.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                idx
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.index.insert(page_id, idx);
        self.push_front(idx);
        idx
    }

    fn remove(&mut self, idx: usize) -> Option<Entry> {
        self.unlink(idx);
        let entry = self.slots[idx].take()?;
        self.index.remove(&entry.page.id);
        self.free_slots.push(idx);
        Some(entry)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

pub struct PageCache {
    pager: Arc<Pager>,
    allocator: Arc<dyn NumaAllocator>,
    node: usize,
    capacity: usize,
    page_size: usize,
    inner: Mutex<CacheInner>,
}

impl PageCache {
    pub fn new(
        pager: Arc<Pager>,
        capacity: usize,
        page_size: usize,
        node: usize,
        allocator: Arc<dyn NumaAllocator>,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            pager,
            allocator,
            node,
            capacity,
            page_size,
            inner: Mutex::new(CacheInner::new(capacity)),
        }
    }

    pub fn node(&self) -> usize {
        self.node
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Runs `f` on the cached page under the shard mutex, loading the page
    /// from disk first on a miss (evicting the LRU tail when full).
    pub fn with_page<R>(&self, page_id: u64, f: impl FnOnce(&mut Page) -> R) -> Result<R> {
        let mut inner = self.inner.lock();

        if let Some(&idx) = inner.index.get(&page_id) {
            inner.touch(idx);
            let entry = inner.slots[idx].as_mut().expect("indexed slot is occupied");
            return Ok(f(&mut entry.page));
        }

        self.evict_if_needed(&mut inner)?;

        let mut buffer = self.allocator.allocate(self.page_size, self.node);
        self.pager.read_page(page_id, buffer.as_mut_slice())?;
        let idx = inner.insert_front(Page {
            id: page_id,
            buffer,
            dirty: false,
        });
        let entry = inner.slots[idx].as_mut().expect("just inserted");
        Ok(f(&mut entry.page))
    }

    /// Evicts the least recently used page when the shard is at capacity.
    /// A dirty victim is written back first; a failed write-back aborts the
    /// eviction with the cache unchanged.
    fn evict_if_needed(&self, inner: &mut CacheInner) -> Result<()> {
        while inner.len() >= self.capacity {
            let victim_idx = match inner.tail {
                Some(idx) => idx,
                None => break,
            };
            {
                let entry = inner.slots[victim_idx].as_ref().expect("tail slot is occupied");
                if entry.page.dirty {
                    self.pager.write_page(entry.page.id, entry.page.data())?;
                }
            }
            inner.remove(victim_idx);
        }
        Ok(())
    }

    pub fn mark_dirty(&self, page_id: u64) {
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.index.get(&page_id) {
            if let Some(entry) = inner.slots[idx].as_mut() {
                entry.page.dirty = true;
            }
        }
    }

    /// Writes every dirty page back, clears the dirty bits, and flushes the
    /// pager. Aborts at the first failing page.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut idx = inner.head;
        while let Some(i) = idx {
            let entry = inner.slots[i].as_mut().expect("linked slot is occupied");
            if entry.page.dirty {
                self.pager.write_page(entry.page.id, entry.page.data())?;
                entry.page.dirty = false;
            }
            idx = entry.next;
        }
        self.pager.flush()
    }

    pub fn page_count(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn dirty_count(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .flatten()
            .filter(|entry| entry.page.dirty)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numa::{system_allocator, NumaOptions};
    use tempfile::tempdir;

    fn test_cache(capacity: usize, page_size: usize) -> (PageCache, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pager = Arc::new(Pager::open(dir.path().join("t.tbl"), page_size).unwrap());
        let allocator = system_allocator(&NumaOptions::default());
        (PageCache::new(pager, capacity, page_size, 0, allocator), dir)
    }

    #[test]
    fn test_miss_loads_zero_page() {
        let (cache, _dir) = test_cache(4, 32);

        let first = cache.with_page(3, |page| page.data()[0]).unwrap();
        assert_eq!(first, 0);
        assert_eq!(cache.page_count(), 1);
    }

    #[test]
    fn test_hit_keeps_content() {
        let (cache, _dir) = test_cache(4, 32);

        cache
            .with_page(0, |page| {
                page.data_mut()[5] = 42;
                page.mark_dirty();
            })
            .unwrap();
        let value = cache.with_page(0, |page| page.data()[5]).unwrap();
        assert_eq!(value, 42);
        assert_eq!(cache.page_count(), 1);
    }

    #[test]
    fn test_lru_evicts_least_recent() {
        let (cache, _dir) = test_cache(2, 32);

        cache.with_page(0, |_| ()).unwrap();
        cache.with_page(1, |_| ()).unwrap();
        cache.with_page(0, |_| ()).unwrap();
        cache.with_page(2, |_| ()).unwrap();

        // Page 1 was least recently used and must have been evicted.
        assert_eq!(cache.page_count(), 2);
        let inner = cache.inner.lock();
        assert!(inner.index.contains_key(&0));
        assert!(!inner.index.contains_key(&1));
        assert!(inner.index.contains_key(&2));
    }

    #[test]
    fn test_dirty_eviction_writes_back() {
        let (cache, _dir) = test_cache(1, 16);

        cache
            .with_page(0, |page| {
                page.data_mut().fill(0xAB);
                page.mark_dirty();
            })
            .unwrap();
        // Forces eviction of page 0.
        cache.with_page(1, |_| ()).unwrap();

        let restored = cache.with_page(0, |page| page.data().to_vec()).unwrap();
        assert!(restored.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_flush_clears_dirty_bits() {
        let (cache, _dir) = test_cache(4, 16);

        for id in 0..3u64 {
            cache
                .with_page(id, |page| {
                    page.data_mut()[0] = id as u8 + 1;
                    page.mark_dirty();
                })
                .unwrap();
        }
        assert_eq!(cache.dirty_count(), 3);

        cache.flush().unwrap();
        assert_eq!(cache.dirty_count(), 0);
    }

    #[test]
    fn test_mark_dirty_by_id() {
        let (cache, _dir) = test_cache(4, 16);

        cache.with_page(0, |_| ()).unwrap();
        assert_eq!(cache.dirty_count(), 0);
        cache.mark_dirty(0);
        assert_eq!(cache.dirty_count(), 1);
        // Unknown ids are ignored.
        cache.mark_dirty(99);
        assert_eq!(cache.dirty_count(), 1);
    }
}
