//! # Column, Value, and Statement Types
//!
//! The vocabulary shared by the storage engine and its callers: column
//! definitions, runtime values, and the statement shapes a parser produces.
//! The engine does not depend on any particular parser; anything that builds
//! these values is a compatible front end.

mod column;
mod statement;
mod value;

pub use column::{Column, ColumnType};
pub use statement::{Condition, SetClause, Statement};
pub use value::Value;
