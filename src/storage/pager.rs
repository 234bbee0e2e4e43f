//! Fixed-page file access.
//!
//! The pager is the only component that touches the backing file. All reads
//! and writes go through one mutex, so page I/O is serialized and the file
//! offset seen by a seek is never clobbered by a concurrent call.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use parking_lot::Mutex;

pub struct Pager {
    path: PathBuf,
    page_size: usize,
    file: Mutex<File>,
}

impl Pager {
    /// Opens `path` read/write, creating it when absent.
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure!(page_size > 0, "page size must be positive");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .wrap_err_with(|| format!("failed to open table file {:?}", path))?;
        Ok(Self {
            path,
            page_size,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn file_size(&self) -> u64 {
        let file = self.file.lock();
        file.metadata().map(|m| m.len()).unwrap_or(0)
    }

    /// Reads page `page_id` into `out`, zero-filling first. Reading past the
    /// end of the file yields an all-zero page; a partial page near EOF is
    /// zero-padded.
    pub fn read_page(&self, page_id: u64, out: &mut [u8]) -> Result<()> {
        ensure!(
            out.len() == self.page_size,
            "page buffer size {} does not match page size {}",
            out.len(),
            self.page_size
        );
        out.fill(0);

        let offset = page_id * self.page_size as u64;
        let mut file = self.file.lock();
        let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        if offset >= file_size {
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek {:?} to offset {}", self.path, offset))?;
        let mut filled = 0;
        while filled < out.len() {
            let n = file
                .read(&mut out[filled..])
                .wrap_err_with(|| format!("failed to read page {} of {:?}", page_id, self.path))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(())
    }

    /// Writes one full page at `page_id * page_size`.
    pub fn write_page(&self, page_id: u64, data: &[u8]) -> Result<()> {
        ensure!(
            data.len() == self.page_size,
            "page buffer size {} does not match page size {}",
            data.len(),
            self.page_size
        );
        let offset = page_id * self.page_size as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek {:?} to offset {}", self.path, offset))?;
        file.write_all(data)
            .wrap_err_with(|| format!("failed to write page {} of {:?}", page_id, self.path))?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_data()
            .wrap_err_with(|| format!("failed to flush {:?}", self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_past_eof_is_zero_page() {
        let dir = tempdir().unwrap();
        let pager = Pager::open(dir.path().join("t.tbl"), 64).unwrap();

        let mut out = vec![0xAAu8; 64];
        pager.read_page(7, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let pager = Pager::open(dir.path().join("t.tbl"), 32).unwrap();

        let data = vec![0x5Cu8; 32];
        pager.write_page(2, &data).unwrap();
        pager.flush().unwrap();

        let mut out = vec![0u8; 32];
        pager.read_page(2, &mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(pager.file_size(), 3 * 32);
    }

    #[test]
    fn test_partial_tail_zero_filled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tbl");
        std::fs::write(&path, [1u8; 10]).unwrap();

        let pager = Pager::open(&path, 16).unwrap();
        let mut out = vec![0xFFu8; 16];
        pager.read_page(0, &mut out).unwrap();
        assert_eq!(&out[..10], &[1u8; 10]);
        assert_eq!(&out[10..], &[0u8; 6]);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let pager = Pager::open(dir.path().join("t.tbl"), 32).unwrap();

        let mut short = vec![0u8; 16];
        assert!(pager.read_page(0, &mut short).is_err());
        assert!(pager.write_page(0, &short).is_err());
    }
}
