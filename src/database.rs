//! # Database Composition
//!
//! The `Database` wires the catalog, the redo log, and one `TableStorage`
//! per table into a single entry point, and owns the open/recover/checkpoint
//! lifecycle.
//!
//! ## Open Sequence
//!
//! ```text
//! open(config)
//!   1. create the base directory (recursively)
//!   2. load the catalog
//!   3. construct + load a TableStorage per catalog entry
//!   4. recover: replay the redo log in LSN order, rebuild free lists,
//!      truncate the log
//! ```
//!
//! A log entry referencing an unknown table aborts `open`; everything the
//! log committed must be re-applicable.
//!
//! ## Checkpointing
//!
//! `checkpoint` flushes every table's dirty pages and then truncates the
//! log. With `auto_checkpoint` (the default) every mutating statement
//! checkpoints, which keeps recovery trivial at the cost of a flush per
//! write. `close` is an explicit final checkpoint; dropping the handle
//! without `close` leaves the log populated, which is exactly what recovery
//! is for.
//!
//! ## Request Dispatch
//!
//! [`Database::execute`] maps parser-produced [`Statement`] values onto the
//! DDL/DML methods, so any front end that builds statements is compatible.
//! Point operations (`read_row`, `update_row`, `delete_row`, `write_row`)
//! and [`Database::node_for_row`] exist for executor-driven callers that
//! route work by page ownership.

use std::sync::Arc;

use eyre::{bail, ensure, Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::catalog::Catalog;
use crate::config::DatabaseConfig;
use crate::numa::NumaOptions;
use crate::records::Schema;
use crate::storage::LogManager;
use crate::table::TableStorage;
use crate::types::{Column, Condition, SetClause, Statement, Value};

/// Outcome of one dispatched statement.
#[derive(Debug)]
pub enum ExecuteResult {
    CreateTable,
    DropTable,
    AlterTable,
    Insert { row_id: u64 },
    Select { rows: Vec<Vec<Value>> },
    Update { rows_affected: usize },
    Delete { rows_affected: usize },
}

pub struct Database {
    config: DatabaseConfig,
    numa_options: NumaOptions,
    catalog: Mutex<Catalog>,
    log: Arc<LogManager>,
    tables: RwLock<HashMap<String, Arc<TableStorage>>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens (creating if needed) the database at `config.base_dir` and runs
    /// crash recovery.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir).wrap_err_with(|| {
            format!("failed to create database directory {:?}", config.base_dir)
        })?;

        let numa_options = NumaOptions::from_env();
        let mut catalog = Catalog::new(config.catalog_path());
        catalog.load()?;
        let log = Arc::new(LogManager::new(config.log_path()));

        let mut tables = HashMap::new();
        for name in catalog.list_tables() {
            let schema = catalog
                .get_schema(&name)
                .ok_or_else(|| eyre::eyre!("table not found: {}", name))?;
            let table = TableStorage::create(
                config.table_path(&name),
                name.clone(),
                schema,
                config.page_size,
                config.cache_pages,
                config.numa_nodes,
                numa_options.clone(),
                Some(Arc::clone(&log)),
            )?;
            table.load()?;
            tables.insert(name, Arc::new(table));
        }

        let db = Self {
            config,
            numa_options,
            catalog: Mutex::new(catalog),
            log,
            tables: RwLock::new(tables),
        };
        db.recover()?;
        Ok(db)
    }

    /// Replays the redo log onto the tables, rebuilds their free lists, and
    /// truncates the log.
    fn recover(&self) -> Result<()> {
        let entries = self.log.read_all()?;
        if entries.is_empty() {
            return Ok(());
        }

        for entry in &entries {
            let table = {
                let tables = self.tables.read();
                tables.get(&entry.table).cloned()
            };
            let table = table.ok_or_else(|| {
                eyre::eyre!("table missing during recovery: {}", entry.table)
            })?;
            table.apply_redo(entry.row_id, &entry.record)?;
        }

        // Flush before truncating: a crash right after the truncate must not
        // lose what the log had committed.
        let tables = self.tables.read();
        for table in tables.values() {
            table.rebuild_free_list()?;
            table.flush()?;
        }
        drop(tables);

        debug!(entries = entries.len(), "replayed redo log");
        self.log.clear()
    }

    /// Final checkpoint. Dropping the handle without closing skips the
    /// checkpoint and leaves the log for recovery.
    pub fn close(&self) -> Result<()> {
        self.checkpoint()
    }

    /// Flushes every table's dirty pages, then truncates the redo log.
    pub fn checkpoint(&self) -> Result<()> {
        let tables = self.tables.read();
        for table in tables.values() {
            table.flush()?;
        }
        drop(tables);
        self.log.clear()?;
        debug!("checkpoint complete");
        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.catalog.lock().list_tables()
    }

    pub fn schema(&self, table: &str) -> Result<Schema> {
        self.catalog
            .lock()
            .get_schema(table)
            .ok_or_else(|| eyre::eyre!("table not found: {}", table))
    }

    pub fn cached_pages_per_node(&self, table: &str) -> Result<Vec<usize>> {
        Ok(self.get_table(table)?.cached_pages_per_node())
    }

    /// NUMA node owning the page that holds `row_id`, for routing executor
    /// submissions.
    pub fn node_for_row(&self, table: &str, row_id: u64) -> Result<usize> {
        Ok(self.get_table(table)?.node_for_row(row_id))
    }

    pub fn create_table(&self, name: &str, columns: Vec<Column>) -> Result<()> {
        ensure!(!columns.is_empty(), "table must have at least one column");
        ensure_unique_columns(&columns)?;

        let key = name.to_lowercase();
        let schema = Schema::new(columns);
        self.catalog.lock().create_table(&key, schema.clone())?;

        let table = TableStorage::create(
            self.config.table_path(&key),
            key.clone(),
            schema,
            self.config.page_size,
            self.config.cache_pages,
            self.config.numa_nodes,
            self.numa_options.clone(),
            Some(Arc::clone(&self.log)),
        )?;
        table.load()?;
        self.tables.write().insert(key, Arc::new(table));
        Ok(())
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        let key = name.to_lowercase();
        self.catalog.lock().drop_table(&key)?;
        self.tables.write().remove(&key);

        let path = self.config.table_path(&key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(eyre::eyre!("failed to remove table file {:?}: {}", path, e)),
        }
    }

    /// Adds a column: rebuilds the table file under the widened schema, then
    /// updates the catalog.
    pub fn alter_add_column(&self, name: &str, column: Column) -> Result<()> {
        let key = name.to_lowercase();
        let new_schema = {
            let catalog = self.catalog.lock();
            let schema = catalog
                .get_schema(&key)
                .ok_or_else(|| eyre::eyre!("table not found: {}", name))?;
            ensure!(
                !schema
                    .columns()
                    .iter()
                    .any(|c| c.name.eq_ignore_ascii_case(&column.name)),
                "column already exists: {}",
                column.name
            );
            let mut columns = schema.columns().to_vec();
            columns.push(column.clone());
            Schema::new(columns)
        };

        self.get_table(&key)?.rebuild_for_schema(new_schema)?;
        self.catalog.lock().alter_add_column(&key, column)
    }

    pub fn insert(&self, table: &str, values: Vec<Value>) -> Result<u64> {
        let row_id = self.get_table(table)?.insert(values)?;
        self.maybe_checkpoint()?;
        Ok(row_id)
    }

    pub fn select(&self, table: &str, filter: Option<&Condition>) -> Result<Vec<Vec<Value>>> {
        self.get_table(table)?.select(filter)
    }

    pub fn update(
        &self,
        table: &str,
        sets: &[SetClause],
        filter: Option<&Condition>,
    ) -> Result<usize> {
        let updated = self.get_table(table)?.update(sets, filter)?;
        self.maybe_checkpoint()?;
        Ok(updated)
    }

    pub fn delete(&self, table: &str, filter: Option<&Condition>) -> Result<usize> {
        let removed = self.get_table(table)?.delete(filter)?;
        self.maybe_checkpoint()?;
        Ok(removed)
    }

    pub fn read_row(&self, table: &str, row_id: u64) -> Result<(Vec<Value>, bool)> {
        self.get_table(table)?.read_row(row_id)
    }

    pub fn update_row(&self, table: &str, row_id: u64, sets: &[SetClause]) -> Result<()> {
        self.get_table(table)?.update_row(row_id, sets)
    }

    pub fn delete_row(&self, table: &str, row_id: u64) -> Result<()> {
        self.get_table(table)?.delete_row(row_id)
    }

    pub fn write_row(
        &self,
        table: &str,
        row_id: u64,
        values: Vec<Value>,
        valid: bool,
    ) -> Result<()> {
        self.get_table(table)?.write_row(row_id, values, valid)
    }

    /// Maps a parsed statement onto the engine.
    pub fn execute(&self, statement: Statement) -> Result<ExecuteResult> {
        match statement {
            Statement::CreateTable { table, columns } => {
                self.create_table(&table, columns)?;
                Ok(ExecuteResult::CreateTable)
            }
            Statement::DropTable { table } => {
                self.drop_table(&table)?;
                Ok(ExecuteResult::DropTable)
            }
            Statement::AlterTableAdd { table, column } => {
                self.alter_add_column(&table, column)?;
                Ok(ExecuteResult::AlterTable)
            }
            Statement::Insert { table, values } => {
                let row_id = self.insert(&table, values)?;
                Ok(ExecuteResult::Insert { row_id })
            }
            Statement::Select { table, filter } => {
                let rows = self.select(&table, filter.as_ref())?;
                Ok(ExecuteResult::Select { rows })
            }
            Statement::Update {
                table,
                sets,
                filter,
            } => {
                let rows_affected = self.update(&table, &sets, filter.as_ref())?;
                Ok(ExecuteResult::Update { rows_affected })
            }
            Statement::Delete { table, filter } => {
                let rows_affected = self.delete(&table, filter.as_ref())?;
                Ok(ExecuteResult::Delete { rows_affected })
            }
        }
    }

    fn get_table(&self, name: &str) -> Result<Arc<TableStorage>> {
        let key = name.to_lowercase();
        self.tables
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| eyre::eyre!("table not found: {}", name))
    }

    fn maybe_checkpoint(&self) -> Result<()> {
        if self.config.auto_checkpoint {
            self.checkpoint()?;
        }
        Ok(())
    }
}

fn ensure_unique_columns(columns: &[Column]) -> Result<()> {
    let mut seen = HashMap::with_capacity(columns.len());
    for column in columns {
        ensure!(!column.name.is_empty(), "column name cannot be empty");
        let key = column.name.to_lowercase();
        if seen.insert(key, ()).is_some() {
            bail!("duplicate column name: {}", column.name);
        }
    }
    Ok(())
}
