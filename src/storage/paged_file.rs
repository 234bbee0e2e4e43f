//! Byte-range facade over the paged cache.
//!
//! `PagedFile` lets callers read and write arbitrary byte ranges while the
//! pool below works in whole pages. A range that spans pages is copied slice
//! by slice under each page's shard lock; writes mark every touched page
//! dirty inside the same critical section that mutates it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::Result;

use crate::numa::NumaOptions;
use crate::storage::{NumaBufferPool, Pager};

pub struct PagedFile {
    pager: Arc<Pager>,
    pool: NumaBufferPool,
}

impl PagedFile {
    pub fn open(
        path: impl AsRef<Path>,
        page_size: usize,
        cache_pages: usize,
        numa_nodes: usize,
        options: &NumaOptions,
    ) -> Result<Self> {
        let pager = Arc::new(Pager::open(path, page_size)?);
        let pool = NumaBufferPool::new(
            Arc::clone(&pager),
            cache_pages,
            page_size,
            numa_nodes,
            options,
        );
        Ok(Self { pager, pool })
    }

    pub fn page_size(&self) -> usize {
        self.pager.page_size()
    }

    pub fn file_size(&self) -> u64 {
        self.pager.file_size()
    }

    pub fn path(&self) -> PathBuf {
        self.pager.path().to_path_buf()
    }

    pub fn node_count(&self) -> usize {
        self.pool.node_count()
    }

    /// The node owning the page that contains `offset`.
    pub fn node_for_offset(&self, offset: u64) -> usize {
        self.pool.node_for_page(offset / self.page_size() as u64)
    }

    pub fn cached_pages_per_node(&self) -> Vec<usize> {
        self.pool.cached_pages_per_node()
    }

    /// Reads `size` bytes starting at `offset`, crossing pages as needed.
    pub fn read_item(&self, offset: u64, size: usize) -> Result<Vec<u8>> {
        let page_size = self.page_size() as u64;
        let mut out = vec![0u8; size];
        let mut current = offset;
        let mut filled = 0usize;

        while filled < size {
            let page_id = current / page_size;
            let page_offset = (current % page_size) as usize;
            let chunk = ((page_size as usize) - page_offset).min(size - filled);

            self.pool.with_page(page_id, |page| {
                out[filled..filled + chunk]
                    .copy_from_slice(&page.data()[page_offset..page_offset + chunk]);
            })?;

            current += chunk as u64;
            filled += chunk;
        }
        Ok(out)
    }

    /// Writes `data` starting at `offset`, marking every touched page dirty.
    pub fn write_item(&self, offset: u64, data: &[u8]) -> Result<()> {
        let page_size = self.page_size() as u64;
        let mut current = offset;
        let mut written = 0usize;

        while written < data.len() {
            let page_id = current / page_size;
            let page_offset = (current % page_size) as usize;
            let chunk = ((page_size as usize) - page_offset).min(data.len() - written);

            self.pool.with_page(page_id, |page| {
                page.data_mut()[page_offset..page_offset + chunk]
                    .copy_from_slice(&data[written..written + chunk]);
                page.mark_dirty();
            })?;

            current += chunk as u64;
            written += chunk;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.pool.flush()
    }

    /// Rebuilds the pager and pool against a (possibly different) file.
    /// Used after a schema rebuild replaces the table file on disk.
    pub fn reset(
        &mut self,
        path: impl AsRef<Path>,
        page_size: usize,
        cache_pages: usize,
        numa_nodes: usize,
        options: &NumaOptions,
    ) -> Result<()> {
        let rebuilt = PagedFile::open(path, page_size, cache_pages, numa_nodes, options)?;
        self.pager = rebuilt.pager;
        self.pool = rebuilt.pool;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_file(page_size: usize) -> (PagedFile, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let file = PagedFile::open(
            dir.path().join("t.tbl"),
            page_size,
            8,
            1,
            &NumaOptions::default(),
        )
        .unwrap();
        (file, dir)
    }

    #[test]
    fn test_cross_page_round_trip() {
        let (file, _dir) = test_file(16);

        // 40 bytes spanning three 16-byte pages, starting mid-page.
        let data: Vec<u8> = (0..40u8).collect();
        file.write_item(10, &data).unwrap();

        let read = file.read_item(10, 40).unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn test_unwritten_range_reads_zero() {
        let (file, _dir) = test_file(32);
        let read = file.read_item(100, 16).unwrap();
        assert!(read.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_flush_persists_through_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tbl");
        {
            let file =
                PagedFile::open(&path, 16, 4, 1, &NumaOptions::default()).unwrap();
            file.write_item(3, b"hello").unwrap();
            file.flush().unwrap();
        }
        let file = PagedFile::open(&path, 16, 4, 1, &NumaOptions::default()).unwrap();
        assert_eq!(file.read_item(3, 5).unwrap(), b"hello");
    }

    #[test]
    fn test_reset_rebinds_to_new_file() {
        let dir = tempdir().unwrap();
        let (mut file, _dir) = test_file(16);

        let other = dir.path().join("other.tbl");
        std::fs::write(&other, b"abcdef").unwrap();
        file.reset(&other, 16, 4, 1, &NumaOptions::default()).unwrap();

        assert_eq!(file.read_item(0, 6).unwrap(), b"abcdef");
        assert_eq!(file.path(), other);
    }
}
