//! Statement values consumed from a parser.

use super::{Column, Value};

/// Single-column equality filter. The only predicate the engine supports.
#[derive(Debug, Clone)]
pub struct Condition {
    pub column: String,
    pub value: Value,
}

impl Condition {
    pub fn equals(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// One `SET column = value` assignment of an UPDATE.
#[derive(Debug, Clone)]
pub struct SetClause {
    pub column: String,
    pub value: Value,
}

impl SetClause {
    pub fn new(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// A parsed request. Produced by an external tokenizer/parser; the engine
/// only consumes these values.
#[derive(Debug, Clone)]
pub enum Statement {
    CreateTable {
        table: String,
        columns: Vec<Column>,
    },
    DropTable {
        table: String,
    },
    AlterTableAdd {
        table: String,
        column: Column,
    },
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Select {
        table: String,
        filter: Option<Condition>,
    },
    Update {
        table: String,
        sets: Vec<SetClause>,
        filter: Option<Condition>,
    },
    Delete {
        table: String,
        filter: Option<Condition>,
    },
}
