//! Column definitions.
//!
//! A column is a name, a type, and (for TEXT) the fixed byte width of the
//! stored field. INT columns always occupy 4 bytes; the `length` field is 0
//! for them and strictly positive for TEXT.

/// Length a TEXT column gets when none was declared.
pub const DEFAULT_TEXT_LENGTH: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// Fixed byte width of a TEXT field; 0 for INT.
    pub length: u32,
}

impl Column {
    /// Creates an INT column.
    pub fn int(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Int,
            length: 0,
        }
    }

    /// Creates a TEXT column with a fixed length. Passing 0 selects the
    /// default length; a stored TEXT column is never zero-width.
    pub fn text(name: impl Into<String>, length: u32) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Text,
            length: if length == 0 { DEFAULT_TEXT_LENGTH } else { length },
        }
    }

    /// Bytes this column occupies inside a record.
    pub fn width(&self) -> usize {
        match self.column_type {
            ColumnType::Int => 4,
            ColumnType::Text => self.length as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_column_width() {
        let col = Column::int("id");
        assert_eq!(col.column_type, ColumnType::Int);
        assert_eq!(col.length, 0);
        assert_eq!(col.width(), 4);
    }

    #[test]
    fn test_text_column_width() {
        let col = Column::text("name", 12);
        assert_eq!(col.width(), 12);
    }

    #[test]
    fn test_text_zero_length_defaults() {
        let col = Column::text("name", 0);
        assert_eq!(col.length, DEFAULT_TEXT_LENGTH);
    }
}
