//! # Table Storage
//!
//! One `TableStorage` owns one table file: a header page followed by
//! fixed-length records addressed by dense row id. It layers row semantics
//! (validity flags, free-slot reuse, redo logging) on top of the byte-range
//! facade of [`PagedFile`].
//!
//! ## File Layout
//!
//! ```text
//! page 0        : 32-byte header ("TBL1", record_size, row_count), rest zero
//! page 1 onward : records at offset page_size + row_id * record_size
//! ```
//!
//! The whole first page is reserved so record offsets never collide with the
//! header, whatever the page size.
//!
//! ## Locking
//!
//! Three layers, always acquired top-down:
//!
//! 1. A table-wide `RwLock` held shared by every row operation and
//!    exclusively by `rebuild_for_schema`, which swaps the file and schema
//!    underneath.
//! 2. A fixed array of page-lock stripes indexed by `page_id % stripes`.
//!    Point operations lock only their row's stripe; scans visit each row
//!    under its stripe, so a scan and a point write to the same page never
//!    interleave mid-record.
//! 3. The meta mutex guarding `row_count` and the free list.
//!
//! ## Write-Ahead Ordering
//!
//! Every mutation appends its redo record (full post-image) to the log
//! before the page cache is touched. Recovery replays those records with
//! [`TableStorage::apply_redo`], which is idempotent when applied in LSN
//! order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{bail, ensure, Result};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{PAGE_LOCK_STRIPES, TABLE_HEADER_SIZE};
use crate::numa::NumaOptions;
use crate::records::Schema;
use crate::storage::{LogManager, LogOp, PagedFile};
use crate::types::{Condition, SetClause, Value};

pub const TABLE_MAGIC: [u8; 4] = *b"TBL1";

/// On-disk table header. Occupies the first 32 bytes of page 0; the rest of
/// the page is zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct TableFileHeader {
    magic: [u8; 4],
    record_size: U32,
    row_count: U64,
    reserved: [u8; 8],
    padding: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<TableFileHeader>() == TABLE_HEADER_SIZE);

impl TableFileHeader {
    pub fn new(record_size: u32, row_count: u64) -> Self {
        Self {
            magic: TABLE_MAGIC,
            record_size: U32::new(record_size),
            row_count: U64::new(row_count),
            reserved: [0; 8],
            padding: [0; 8],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= TABLE_HEADER_SIZE,
            "table header too small: {} < {}",
            bytes.len(),
            TABLE_HEADER_SIZE
        );
        let header = Self::read_from_bytes(&bytes[..TABLE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse table header: {:?}", e))?;
        ensure!(header.magic == TABLE_MAGIC, "invalid table file magic");
        Ok(header)
    }

    pub fn record_size(&self) -> u32 {
        self.record_size.get()
    }

    pub fn row_count(&self) -> u64 {
        self.row_count.get()
    }
}

/// Schema and file, replaced together by a schema rebuild.
struct TableCore {
    schema: Schema,
    file: PagedFile,
}

struct TableMeta {
    row_count: u64,
    free_list: Vec<u64>,
}

pub struct TableStorage {
    name: String,
    path: PathBuf,
    page_size: usize,
    cache_pages: usize,
    numa_nodes: usize,
    numa_options: NumaOptions,
    log: Option<Arc<LogManager>>,
    core: RwLock<TableCore>,
    meta: Mutex<TableMeta>,
    stripes: Vec<Mutex<()>>,
}

impl TableStorage {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        path: impl AsRef<Path>,
        name: impl Into<String>,
        schema: Schema,
        page_size: usize,
        cache_pages: usize,
        numa_nodes: usize,
        numa_options: NumaOptions,
        log: Option<Arc<LogManager>>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = PagedFile::open(&path, page_size, cache_pages, numa_nodes, &numa_options)?;
        Ok(Self {
            name: name.into(),
            path,
            page_size,
            cache_pages,
            numa_nodes,
            numa_options,
            log,
            core: RwLock::new(TableCore { schema, file }),
            meta: Mutex::new(TableMeta {
                row_count: 0,
                free_list: Vec::new(),
            }),
            stripes: (0..PAGE_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    /// Initializes a fresh file with a header, or validates an existing one
    /// and rebuilds the free list from a full scan.
    pub fn load(&self) -> Result<()> {
        let core = self.core.read();
        ensure!(
            core.schema.record_size() <= self.page_size,
            "record size {} exceeds page size {}",
            core.schema.record_size(),
            self.page_size
        );

        if core.file.file_size() == 0 {
            self.meta.lock().row_count = 0;
            return self.write_header(&core);
        }

        let bytes = core.file.read_item(0, TABLE_HEADER_SIZE)?;
        let header = TableFileHeader::from_bytes(&bytes)?;
        ensure!(
            header.record_size() as usize == core.schema.record_size(),
            "record size mismatch with schema for table {}",
            self.name
        );
        self.meta.lock().row_count = header.row_count();
        self.rebuild_free_list_in(&core)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> Schema {
        self.core.read().schema.clone()
    }

    /// Records ever allocated, live and tombstoned alike.
    pub fn row_count(&self) -> u64 {
        self.meta.lock().row_count
    }

    pub fn free_rows(&self) -> Vec<u64> {
        self.meta.lock().free_list.clone()
    }

    pub fn page_id_for_row(&self, row_id: u64) -> u64 {
        let core = self.core.read();
        self.record_offset(&core, row_id) / self.page_size as u64
    }

    /// NUMA node owning the page that holds `row_id`.
    pub fn node_for_row(&self, row_id: u64) -> usize {
        let core = self.core.read();
        let offset = self.record_offset(&core, row_id);
        core.file.node_for_offset(offset)
    }

    pub fn cached_pages_per_node(&self) -> Vec<usize> {
        self.core.read().file.cached_pages_per_node()
    }

    /// Inserts a row, reusing a tombstoned slot when one is free.
    /// Returns the row id.
    pub fn insert(&self, values: Vec<Value>) -> Result<u64> {
        let core = self.core.read();
        let record = core.schema.encode_record(values, true)?;

        let (row_id, reused) = {
            let mut meta = self.meta.lock();
            match meta.free_list.pop() {
                Some(row_id) => (row_id, true),
                None => {
                    let row_id = meta.row_count;
                    meta.row_count += 1;
                    (row_id, false)
                }
            }
        };

        if let Some(log) = &self.log {
            log.append(LogOp::Insert, &self.name, row_id, &record)?;
        }
        {
            let _stripe = self.stripe_for_row(&core, row_id).lock();
            self.write_record(&core, row_id, &record)?;
        }
        if !reused {
            self.write_header(&core)?;
        }
        Ok(row_id)
    }

    /// Full scan with an optional single-column equality filter. Rows come
    /// back in ascending row-id order.
    pub fn select(&self, filter: Option<&Condition>) -> Result<Vec<Vec<Value>>> {
        let core = self.core.read();
        let filter = self.resolve_filter(&core, filter)?;
        let row_count = self.meta.lock().row_count;

        let mut rows = Vec::new();
        for row_id in 0..row_count {
            let record = {
                let _stripe = self.stripe_for_row(&core, row_id).lock();
                self.read_record(&core, row_id)?
            };
            let (values, valid) = core.schema.decode_record(&record)?;
            if !valid {
                continue;
            }
            if let Some((idx, expected)) = &filter {
                if &values[*idx] != expected {
                    continue;
                }
            }
            rows.push(values);
        }
        Ok(rows)
    }

    /// Updates every matching live row. Returns the number updated.
    pub fn update(&self, sets: &[SetClause], filter: Option<&Condition>) -> Result<usize> {
        ensure!(!sets.is_empty(), "no columns to update");
        let core = self.core.read();
        let sets = self.resolve_sets(&core, sets)?;
        let filter = self.resolve_filter(&core, filter)?;
        let row_count = self.meta.lock().row_count;

        let mut updated = 0;
        for row_id in 0..row_count {
            let _stripe = self.stripe_for_row(&core, row_id).lock();
            let record = self.read_record(&core, row_id)?;
            let (mut values, valid) = core.schema.decode_record(&record)?;
            if !valid {
                continue;
            }
            if let Some((idx, expected)) = &filter {
                if &values[*idx] != expected {
                    continue;
                }
            }
            for (idx, value) in &sets {
                values[*idx] = value.clone();
            }
            let record = core.schema.encode_record(values, true)?;
            if let Some(log) = &self.log {
                log.append(LogOp::Update, &self.name, row_id, &record)?;
            }
            self.write_record(&core, row_id, &record)?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Tombstones every matching live row and adds it to the free list.
    /// Returns the number removed.
    pub fn delete(&self, filter: Option<&Condition>) -> Result<usize> {
        let core = self.core.read();
        let filter = self.resolve_filter(&core, filter)?;
        let row_count = self.meta.lock().row_count;

        let mut removed = 0;
        for row_id in 0..row_count {
            let _stripe = self.stripe_for_row(&core, row_id).lock();
            let mut record = self.read_record(&core, row_id)?;
            let (values, valid) = core.schema.decode_record(&record)?;
            if !valid {
                continue;
            }
            if let Some((idx, expected)) = &filter {
                if &values[*idx] != expected {
                    continue;
                }
            }
            record[0] = 0;
            if let Some(log) = &self.log {
                log.append(LogOp::Delete, &self.name, row_id, &record)?;
            }
            self.write_record(&core, row_id, &record)?;
            self.meta.lock().free_list.push(row_id);
            removed += 1;
        }
        Ok(removed)
    }

    /// Point read under the row's stripe lock.
    pub fn read_row(&self, row_id: u64) -> Result<(Vec<Value>, bool)> {
        let core = self.core.read();
        self.ensure_in_range(row_id)?;
        let record = {
            let _stripe = self.stripe_for_row(&core, row_id).lock();
            self.read_record(&core, row_id)?
        };
        core.schema.decode_record(&record)
    }

    /// Point update; fails with "row is deleted" on a tombstoned slot.
    pub fn update_row(&self, row_id: u64, sets: &[SetClause]) -> Result<()> {
        ensure!(!sets.is_empty(), "no columns to update");
        let core = self.core.read();
        self.ensure_in_range(row_id)?;
        let sets = self.resolve_sets(&core, sets)?;

        let _stripe = self.stripe_for_row(&core, row_id).lock();
        let record = self.read_record(&core, row_id)?;
        let (mut values, valid) = core.schema.decode_record(&record)?;
        if !valid {
            bail!("row is deleted");
        }
        for (idx, value) in &sets {
            values[*idx] = value.clone();
        }
        let record = core.schema.encode_record(values, true)?;
        if let Some(log) = &self.log {
            log.append(LogOp::Update, &self.name, row_id, &record)?;
        }
        self.write_record(&core, row_id, &record)
    }

    /// Point delete; fails with "row is deleted" on a tombstoned slot.
    pub fn delete_row(&self, row_id: u64) -> Result<()> {
        let core = self.core.read();
        self.ensure_in_range(row_id)?;

        let _stripe = self.stripe_for_row(&core, row_id).lock();
        let mut record = self.read_record(&core, row_id)?;
        if record[0] == 0 {
            bail!("row is deleted");
        }
        record[0] = 0;
        if let Some(log) = &self.log {
            log.append(LogOp::Delete, &self.name, row_id, &record)?;
        }
        self.write_record(&core, row_id, &record)?;
        self.meta.lock().free_list.push(row_id);
        Ok(())
    }

    /// Overwrites a slot with a full row. `valid = false` writes a
    /// tombstone. The free list is kept consistent with the validity flag.
    pub fn write_row(&self, row_id: u64, values: Vec<Value>, valid: bool) -> Result<()> {
        let core = self.core.read();
        self.ensure_in_range(row_id)?;
        let record = core.schema.encode_record(values, valid)?;

        let op = if valid { LogOp::Insert } else { LogOp::Delete };
        if let Some(log) = &self.log {
            log.append(op, &self.name, row_id, &record)?;
        }
        {
            let _stripe = self.stripe_for_row(&core, row_id).lock();
            self.write_record(&core, row_id, &record)?;
        }

        let mut meta = self.meta.lock();
        if valid {
            meta.free_list.retain(|&r| r != row_id);
        } else if !meta.free_list.contains(&row_id) {
            meta.free_list.push(row_id);
        }
        Ok(())
    }

    /// Recovery path: writes a logged record verbatim, growing `row_count`
    /// (and the header) when the log refers past the current end. Idempotent
    /// when applied in LSN order.
    pub fn apply_redo(&self, row_id: u64, record: &[u8]) -> Result<()> {
        let core = self.core.read();
        ensure!(
            record.len() == core.schema.record_size(),
            "redo record size mismatch for table {}",
            self.name
        );

        {
            let mut meta = self.meta.lock();
            if row_id >= meta.row_count {
                meta.row_count = row_id + 1;
                let row_count = meta.row_count;
                self.write_header_with(&core, row_count)?;
            }
        }

        let _stripe = self.stripe_for_row(&core, row_id).lock();
        self.write_record(&core, row_id, record)
    }

    /// Scans every slot and rebuilds the free list from validity flags.
    pub fn rebuild_free_list(&self) -> Result<()> {
        let core = self.core.read();
        self.rebuild_free_list_in(&core)
    }

    /// Rewrites the table under `new_schema`: copies every slot into a
    /// temporary file (columns mapped by name, missing ones defaulted),
    /// atomically swaps it in with a backup for rollback, then rebinds the
    /// paged file and rebuilds the free list.
    pub fn rebuild_for_schema(&self, new_schema: Schema) -> Result<()> {
        let mut core = self.core.write();
        let row_count = self.meta.lock().row_count;

        let temp_path = path_with_suffix(&self.path, ".tmp");
        remove_if_exists(&temp_path)?;

        {
            let temp = TableStorage::create(
                &temp_path,
                self.name.clone(),
                new_schema.clone(),
                self.page_size,
                self.cache_pages,
                self.numa_nodes,
                self.numa_options.clone(),
                None,
            )?;
            temp.load()?;

            let temp_core = temp.core.read();
            let defaults = new_schema.default_values();
            for row_id in 0..row_count {
                let record = self.read_record(&core, row_id)?;
                let (values, valid) = core.schema.decode_record(&record)?;

                let mut mapped = Vec::with_capacity(new_schema.columns().len());
                for (new_idx, column) in new_schema.columns().iter().enumerate() {
                    match core.schema.column_index(&column.name) {
                        Some(old_idx) => mapped.push(values[old_idx].clone()),
                        None => mapped.push(defaults[new_idx].clone()),
                    }
                }
                let new_record = new_schema.encode_record(mapped, valid)?;
                temp.write_record(&temp_core, row_id, &new_record)?;
            }
            drop(temp_core);

            temp.meta.lock().row_count = row_count;
            let temp_core = temp.core.read();
            temp.write_header_with(&temp_core, row_count)?;
            temp_core.file.flush()?;
        }

        // Swap files with a backup so a failed rename can roll back.
        let backup_path = path_with_suffix(&self.path, ".bak");
        remove_if_exists(&backup_path)?;
        std::fs::rename(&self.path, &backup_path)
            .map_err(|e| eyre::eyre!("failed to back up table file {:?}: {}", self.path, e))?;
        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::rename(&backup_path, &self.path);
            bail!("failed to replace table file {:?}: {}", self.path, e);
        }
        remove_if_exists(&backup_path)?;

        core.schema = new_schema;
        core.file.reset(
            &self.path,
            self.page_size,
            self.cache_pages,
            self.numa_nodes,
            &self.numa_options,
        )?;
        self.rebuild_free_list_in(&core)
    }

    pub fn flush(&self) -> Result<()> {
        self.core.read().file.flush()
    }

    fn record_offset(&self, core: &TableCore, row_id: u64) -> u64 {
        // The first page is reserved for the header.
        self.page_size as u64 + row_id * core.schema.record_size() as u64
    }

    fn stripe_for_row(&self, core: &TableCore, row_id: u64) -> &Mutex<()> {
        let page_id = self.record_offset(core, row_id) / self.page_size as u64;
        &self.stripes[(page_id % self.stripes.len() as u64) as usize]
    }

    fn ensure_in_range(&self, row_id: u64) -> Result<()> {
        let row_count = self.meta.lock().row_count;
        ensure!(
            row_id < row_count,
            "row id {} out of range for table {}",
            row_id,
            self.name
        );
        Ok(())
    }

    fn read_record(&self, core: &TableCore, row_id: u64) -> Result<Vec<u8>> {
        core.file
            .read_item(self.record_offset(core, row_id), core.schema.record_size())
    }

    fn write_record(&self, core: &TableCore, row_id: u64, record: &[u8]) -> Result<()> {
        ensure!(
            record.len() == core.schema.record_size(),
            "record size mismatch for table {}",
            self.name
        );
        core.file
            .write_item(self.record_offset(core, row_id), record)
    }

    fn write_header(&self, core: &TableCore) -> Result<()> {
        let meta = self.meta.lock();
        self.write_header_with(core, meta.row_count)
    }

    fn write_header_with(&self, core: &TableCore, row_count: u64) -> Result<()> {
        let header = TableFileHeader::new(core.schema.record_size() as u32, row_count);
        core.file.write_item(0, header.as_bytes())
    }

    fn resolve_filter(
        &self,
        core: &TableCore,
        filter: Option<&Condition>,
    ) -> Result<Option<(usize, Value)>> {
        let Some(condition) = filter else {
            return Ok(None);
        };
        let idx = core
            .schema
            .column_index(&condition.column)
            .ok_or_else(|| eyre::eyre!("unknown column in WHERE: {}", condition.column))?;
        let value = core.schema.normalize_value(idx, condition.value.clone())?;
        Ok(Some((idx, value)))
    }

    fn resolve_sets(
        &self,
        core: &TableCore,
        sets: &[SetClause],
    ) -> Result<SmallVec<[(usize, Value); 4]>> {
        sets.iter()
            .map(|set| {
                let idx = core
                    .schema
                    .column_index(&set.column)
                    .ok_or_else(|| eyre::eyre!("unknown column in SET: {}", set.column))?;
                let value = core.schema.normalize_value(idx, set.value.clone())?;
                Ok((idx, value))
            })
            .collect()
    }

    fn rebuild_free_list_in(&self, core: &TableCore) -> Result<()> {
        let row_count = self.meta.lock().row_count;
        let mut free_list = Vec::new();
        for row_id in 0..row_count {
            let _stripe = self.stripe_for_row(core, row_id).lock();
            let record = self.read_record(core, row_id)?;
            if record[0] == 0 {
                free_list.push(row_id);
            }
        }
        self.meta.lock().free_list = free_list;
        Ok(())
    }
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(eyre::eyre!("failed to remove {:?}: {}", path, e)),
    }
}
