//! # MiniDB - NUMA-Aware Embedded Storage Engine
//!
//! MiniDB is a small embedded relational storage engine built around a
//! NUMA-aware paged buffer pool. Rows are fixed-length, mutations are
//! redo-logged before they touch the cache, and a sharded worker pool routes
//! row-level operations to the NUMA node that owns the affected page.
//!
//! ## Quick Start
//!
//! ```ignore
//! use minidb::{Column, Condition, Database, DatabaseConfig, Value};
//!
//! let db = Database::open(DatabaseConfig::new("./mydb"))?;
//!
//! db.create_table("users", vec![
//!     Column::int("id"),
//!     Column::text("name", 32),
//! ])?;
//!
//! let row_id = db.insert("users", vec![Value::Int(1), Value::text("alice")])?;
//! let rows = db.select("users", Some(&Condition::equals("id", Value::Int(1))))?;
//! ```
//!
//! ## Architecture
//!
//! MiniDB uses a layered architecture:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │     Public API (Database)           │
//! ├─────────────────────────────────────┤
//! │  Catalog  │  Statement dispatch     │
//! ├───────────┴─────────────────────────┤
//! │  TableStorage (rows, free list,     │
//! │  page-stripe locks, redo append)    │
//! ├─────────────────────────────────────┤
//! │  PagedFile (byte-range facade)      │
//! ├─────────────────────────────────────┤
//! │  NumaBufferPool (per-node LRU       │
//! │  shards, page_id % nodes routing)   │
//! ├─────────────────────────────────────┤
//! │  Pager (fixed-page file I/O) + log  │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! ```text
//! database_dir/
//! ├── catalog.meta         # table name -> schema, one line per table
//! ├── db.log               # redo log, truncated at every checkpoint
//! ├── users.tbl            # one fixed-record file per table
//! └── orders.tbl
//! ```
//!
//! ## Durability Model
//!
//! Every mutation appends a redo record (the full row post-image) to the log
//! and flushes it before the cached page is modified. A checkpoint flushes
//! every table's dirty pages and then truncates the log; on open, surviving
//! log entries are replayed in LSN order on top of whatever the data files
//! hold.
//!
//! ## Module Overview
//!
//! - [`storage`]: pager, per-node page-cache shards, buffer pool, redo log
//! - [`numa`]: topology/allocator abstraction, env overrides, thread binding
//! - [`records`]: fixed-length record schema and codec
//! - [`table`]: per-table row storage with lock striping
//! - [`catalog`]: persisted schema map
//! - [`database`]: composition, recovery, DDL/DML entry points
//! - [`executor`]: per-node worker groups with FIFO queues

pub mod catalog;
pub mod config;
pub mod database;
pub mod executor;
pub mod numa;
pub mod records;
pub mod storage;
pub mod table;
pub mod types;

pub use catalog::Catalog;
pub use config::DatabaseConfig;
pub use database::{Database, ExecuteResult};
pub use executor::NumaExecutor;
pub use records::Schema;
pub use types::{Column, ColumnType, Condition, SetClause, Statement, Value};
