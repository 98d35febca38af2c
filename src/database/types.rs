// src/database/types.rs
use std::fmt;

use crate::errors::GpsReaderError;

/// SQL identifier of a GPS table.
///
/// Table names are interpolated into statement text, so only ASCII letters,
/// digits and underscores are accepted, with a non-digit first character.
/// Statements use the [`TableName::quoted`] form, which also admits keywords
/// such as `order`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: &str) -> Result<Self, GpsReaderError> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(GpsReaderError::InvalidTableName(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted identifier for statement text
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self("gps".to_string())
    }
}

impl TryFrom<&str> for TableName {
    type Error = GpsReaderError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What `insert_frame` does when the table already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Create the table if needed and append
    #[default]
    Append,
    /// Drop and recreate the table before inserting
    Replace,
    /// Refuse to insert into an existing table
    Fail,
}
