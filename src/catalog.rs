//! # Catalog
//!
//! The catalog persists the table-name → schema map as one line of text per
//! table:
//!
//! ```text
//! users|id:INT|name:TEXT(32)
//! ```
//!
//! Table names are canonicalized to lowercase on save and matched
//! case-insensitively; column names keep their declared case. The file is
//! rewritten whole after every mutation. Like the redo log, the format is
//! plaintext and tolerant: a malformed line is skipped on load rather than
//! failing startup.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use hashbrown::HashMap;

use crate::records::Schema;
use crate::types::{Column, ColumnType};

pub struct Catalog {
    path: PathBuf,
    schemas: HashMap<String, Schema>,
}

impl Catalog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            schemas: HashMap::new(),
        }
    }

    /// Loads the catalog file. A missing file yields an empty catalog;
    /// malformed lines are skipped.
    pub fn load(&mut self) -> Result<()> {
        self.schemas.clear();
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("failed to open catalog {:?}", self.path))
            }
        };

        for line in BufReader::new(file).lines() {
            let line =
                line.wrap_err_with(|| format!("failed to read catalog {:?}", self.path))?;
            if let Some((name, schema)) = parse_line(&line) {
                self.schemas.insert(name, schema);
            }
        }
        Ok(())
    }

    /// Rewrites the whole catalog file.
    pub fn save(&self) -> Result<()> {
        let mut file = File::create(&self.path)
            .wrap_err_with(|| format!("failed to write catalog {:?}", self.path))?;

        let mut names: Vec<&String> = self.schemas.keys().collect();
        names.sort();
        for name in names {
            let schema = &self.schemas[name];
            let mut line = name.clone();
            for column in schema.columns() {
                line.push('|');
                line.push_str(&column.name);
                line.push(':');
                line.push_str(&format_column_type(column));
            }
            line.push('\n');
            file.write_all(line.as_bytes())
                .wrap_err_with(|| format!("failed to write catalog {:?}", self.path))?;
        }
        Ok(())
    }

    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<()> {
        let key = name.to_lowercase();
        ensure!(
            !self.schemas.contains_key(&key),
            "table already exists: {}",
            name
        );
        self.schemas.insert(key, schema);
        self.save()
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let key = name.to_lowercase();
        ensure!(
            self.schemas.remove(&key).is_some(),
            "table not found: {}",
            name
        );
        self.save()
    }

    pub fn alter_add_column(&mut self, name: &str, column: Column) -> Result<()> {
        let key = name.to_lowercase();
        let schema = self
            .schemas
            .get(&key)
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
        columns.push(column);
        self.schemas.insert(key, Schema::new(columns));
        self.save()
    }

    pub fn get_schema(&self, name: &str) -> Option<Schema> {
        self.schemas.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(&name.to_lowercase())
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }
}

fn parse_line(line: &str) -> Option<(String, Schema)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut parts = line.split('|');
    let name = parts.next()?.trim().to_lowercase();
    if name.is_empty() {
        return None;
    }

    let mut columns = Vec::new();
    for part in parts {
        let (col_name, type_str) = part.split_once(':')?;
        let col_name = col_name.trim();
        if col_name.is_empty() {
            return None;
        }
        columns.push(parse_column_type(col_name, type_str.trim())?);
    }
    if columns.is_empty() {
        return None;
    }
    Some((name, Schema::new(columns)))
}

/// Parses `INT`, `TEXT`, or `TEXT(n)` (case-insensitive). `TEXT` without a
/// length gets the default width.
fn parse_column_type(name: &str, type_str: &str) -> Option<Column> {
    let upper = type_str.to_uppercase();
    if upper == "INT" {
        return Some(Column::int(name));
    }
    if upper == "TEXT" {
        return Some(Column::text(name, 0));
    }
    let rest = upper.strip_prefix("TEXT(")?;
    let digits = rest.strip_suffix(')')?;
    let length: u32 = digits.trim().parse().ok()?;
    if length == 0 {
        return None;
    }
    Some(Column::text(name, length))
}

fn format_column_type(column: &Column) -> String {
    match column.column_type {
        ColumnType::Int => "INT".to_string(),
        ColumnType::Text => format!("TEXT({})", column.length),
    }
}
