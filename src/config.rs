//! Application configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;
use tracing::warn;

use crate::database::TableName;
use crate::errors::GpsReaderError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Directory holding one `<company>.db` file per company
    pub dir: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Where maps and charts are written
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

fn default_table() -> String {
    "gps".to_string()
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(100)
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("database.dir", ".")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("GPSREADER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl DatabaseConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            table: default_table(),
            acquire_timeout: default_acquire_timeout(),
        }
    }

    /// Database file of a company
    pub fn company_path(&self, company: &str) -> PathBuf {
        self.dir.join(format!("{company}.db"))
    }

    pub fn table_name(&self) -> Result<TableName, GpsReaderError> {
        TableName::new(&self.table)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), GpsReaderError> {
        self.validate_dir()?;
        self.validate_acquire_timeout()?;
        self.table_name()?;
        self.ensure_directory_exists(&self.dir)?;
        Ok(())
    }

    fn validate_dir(&self) -> Result<(), GpsReaderError> {
        if self.dir.as_os_str().is_empty() {
            return Err(GpsReaderError::ConfigurationError {
                message: "Database directory cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    fn validate_acquire_timeout(&self) -> Result<(), GpsReaderError> {
        if self.acquire_timeout.is_zero() {
            return Err(GpsReaderError::ConfigurationError {
                message: "Connection acquire timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_directory_exists(&self, dir: &Path) -> Result<(), GpsReaderError> {
        if !dir.exists() {
            warn!("Database directory does not exist, attempting to create it");
            std::fs::create_dir_all(dir).map_err(|e| GpsReaderError::ConfigurationError {
                message: format!("Could not create database directory: {}", e),
            })?;
        }
        Ok(())
    }
}
