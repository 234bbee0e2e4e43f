//! # Redo Log
//!
//! Append-only text log used to roll the data files forward after a crash.
//! One entry per line:
//!
//! ```text
//! LSN|OP|TABLE|ROW_ID|HEX(RECORD)
//! ```
//!
//! `OP` is INSERT, UPDATE, or DELETE; the record bytes are the full post-
//! image of the row (validity byte included), hex-encoded uppercase.
//!
//! ## Write Protocol
//!
//! `append` holds the log mutex for open-append-write-sync, so entries are
//! totally ordered by LSN and an entry is durable before `append` returns.
//! Callers append before mutating the page cache, which gives the engine its
//! write-ahead ordering: any change that could be observed after a crash is
//! preceded in the log by its redo record.
//!
//! ## Read Protocol
//!
//! `read_all` parses every line and silently skips malformed ones. The log
//! is plaintext; a single corrupted line must not prevent startup. File
//! order equals LSN order, so replay in read order is replay in LSN order.
//!
//! ## Truncation
//!
//! `clear` truncates the file after a checkpoint. LSNs keep increasing
//! within the process lifetime; recovery only relies on relative order
//! within one log generation.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOp {
    Insert,
    Update,
    Delete,
}

impl LogOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogOp::Insert => "INSERT",
            LogOp::Update => "UPDATE",
            LogOp::Delete => "DELETE",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(LogOp::Insert),
            "UPDATE" => Some(LogOp::Update),
            "DELETE" => Some(LogOp::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub lsn: u64,
    pub op: LogOp,
    pub table: String,
    pub row_id: u64,
    pub record: Vec<u8>,
}

pub struct LogManager {
    path: PathBuf,
    next_lsn: Mutex<u64>,
}

impl LogManager {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            next_lsn: Mutex::new(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry and syncs it to disk. Returns the entry's LSN.
    pub fn append(&self, op: LogOp, table: &str, row_id: u64, record: &[u8]) -> Result<u64> {
        let mut next_lsn = self.next_lsn.lock();
        let lsn = *next_lsn;

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .wrap_err_with(|| format!("failed to open log file {:?}", self.path))?;

        let line = format!(
            "{}|{}|{}|{}|{}\n",
            lsn,
            op.as_str(),
            table,
            row_id,
            hex::encode_upper(record)
        );
        file.write_all(line.as_bytes())
            .wrap_err_with(|| format!("failed to write log entry to {:?}", self.path))?;
        file.sync_data()
            .wrap_err_with(|| format!("failed to sync log file {:?}", self.path))?;

        *next_lsn = lsn + 1;
        Ok(lsn)
    }

    /// Reads every entry in file order (equal to LSN order). A missing file
    /// yields an empty log; malformed lines are skipped.
    pub fn read_all(&self) -> Result<Vec<LogEntry>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("failed to open log file {:?}", self.path))
            }
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line =
                line.wrap_err_with(|| format!("failed to read log file {:?}", self.path))?;
            if let Some(entry) = parse_line(&line) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Truncates the log file. Idempotent.
    pub fn clear(&self) -> Result<()> {
        let _next_lsn = self.next_lsn.lock();
        File::create(&self.path)
            .wrap_err_with(|| format!("failed to truncate log file {:?}", self.path))?;
        Ok(())
    }
}

fn parse_line(line: &str) -> Option<LogEntry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 5 {
        return None;
    }
    Some(LogEntry {
        lsn: parts[0].parse().ok()?,
        op: LogOp::parse(parts[1])?,
        table: parts[2].to_string(),
        row_id: parts[3].parse().ok()?,
        record: hex::decode(parts[4]).ok()?,
    })
}
