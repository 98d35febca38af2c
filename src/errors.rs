//! Errors for GPS route reader
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpsReaderError {
    #[error("'{argument}' argument must be {expected} not {found}")]
    InvalidArgumentType {
        argument: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("Required date format [\"yyyy-mm-dd\", \"yyyy-mm-dd\"]: {0}")]
    InvalidDateRange(String),

    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Column '{column}' has {found} rows, expected {expected}")]
    MisalignedFrame {
        column: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("No data selected.")]
    NoData,

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Chart rendering error: {0}")]
    ChartError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}
