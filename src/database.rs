// src/database.rs
//! SQLite storage of GPS fixes, one database file per company.

mod models;
mod types;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, error, info};

pub use models::DuplicateGroup;
pub use types::{InsertMode, TableName};

use crate::{
    config::DatabaseConfig,
    errors::GpsReaderError,
    models::{FixFrame, GpsFix, NewGpsFix, SearchFilter},
};
use models::FixRow;

const SELECT_COLUMNS: &str = "id, dt, vehicle, driver, position, country, speed, mileage, \
                              ignition_status, engine_status, longitude, latitude";

/// Store of GPS fixes backed by one SQLite file.
///
/// The pool holds a single connection, so the connection is owned by this
/// instance for its whole lifetime.
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Open or create the database file at `path`
    pub async fn open(path: &Path, acquire_timeout: Duration) -> Result<Self, GpsReaderError> {
        info!("Opening database at {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(acquire_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to open database {}: {}", path.display(), e);
                e
            })?;

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// Open the database of `company` under the configured directory
    pub async fn from_config(
        config: &DatabaseConfig,
        company: &str,
    ) -> Result<Self, GpsReaderError> {
        config.validate()?;
        Self::open(&config.company_path(company), config.acquire_timeout).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Close the connection and remove the database file
    pub async fn delete(self) -> Result<(), GpsReaderError> {
        let path = self.path.clone();
        self.close().await;
        Self::delete_database(&path)
    }

    /// Remove a database file together with its WAL side files
    pub fn delete_database(path: &Path) -> Result<(), GpsReaderError> {
        std::fs::remove_file(path)?;
        for suffix in ["-wal", "-shm"] {
            let mut side = path.as_os_str().to_owned();
            side.push(suffix);
            let side = PathBuf::from(side);
            if side.exists() {
                std::fs::remove_file(&side)?;
            }
        }
        info!("{} deleted successfully.", path.display());
        Ok(())
    }

    /// Create an empty GPS table, unless it already exists
    pub async fn create_table(&self, table: &TableName) -> Result<(), GpsReaderError> {
        let quoted = table.quoted();
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {quoted} (
                "id" INTEGER NOT NULL,
                "dt" TIMESTAMP NOT NULL,
                "vehicle" TEXT,
                "driver" TEXT,
                "position" TEXT,
                "country" TEXT,
                "speed" INTEGER,
                "mileage" REAL,
                "ignition_status" INTEGER,
                "engine_status" INTEGER,
                "longitude" REAL,
                "latitude" REAL,
                PRIMARY KEY("id")
            )"#
        ))
        .execute(&self.pool)
        .await?;
        debug!("Table {} ready", table);
        Ok(())
    }

    pub async fn drop_table(&self, table: &TableName) -> Result<(), GpsReaderError> {
        let quoted = table.quoted();
        sqlx::query(&format!("DROP TABLE IF EXISTS {quoted}"))
            .execute(&self.pool)
            .await?;
        info!("Table {} dropped", table);
        Ok(())
    }

    pub async fn table_exists(&self, table: &TableName) -> Result<bool, GpsReaderError> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")
                .bind(table.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Append fixes in one transaction, returning the number inserted
    pub async fn insert_rows(
        &self,
        table: &TableName,
        rows: &[NewGpsFix],
    ) -> Result<u64, GpsReaderError> {
        let mut batch = self.begin_transaction().await?;
        batch.insert_rows(table, rows).await?;
        let inserted = batch.commit().await?;

        info!("{} rows added.", inserted);
        Ok(inserted)
    }

    /// Start an explicit transaction on the store's connection.
    ///
    /// Other calls on this `Database` wait for the connection until the batch
    /// is committed or rolled back. A dropped batch is rolled back.
    pub async fn begin_transaction(&self) -> Result<Batch, GpsReaderError> {
        Ok(Batch {
            tx: self.pool.begin().await?,
            inserted: 0,
        })
    }

    /// Rows inserted, updated or deleted since the connection was opened
    pub async fn total_changes(&self) -> Result<u64, GpsReaderError> {
        let changes: i64 = sqlx::query_scalar("SELECT total_changes()")
            .fetch_one(&self.pool)
            .await?;
        Ok(changes as u64)
    }

    /// Bulk insert a column-oriented frame. Identifiers are always reassigned.
    pub async fn insert_frame(
        &self,
        table: &TableName,
        frame: &FixFrame,
        mode: InsertMode,
    ) -> Result<u64, GpsReaderError> {
        frame.validate()?;
        match mode {
            InsertMode::Append => {}
            InsertMode::Replace => self.drop_table(table).await?,
            InsertMode::Fail => {
                if self.table_exists(table).await? {
                    return Err(GpsReaderError::TableExists(table.to_string()));
                }
            }
        }
        self.create_table(table).await?;

        let rows: Vec<NewGpsFix> = (0..frame.len()).filter_map(|i| frame.new_fix(i)).collect();
        self.insert_rows(table, &rows).await
    }

    /// Prepare a search. Nothing is queried until the result is fetched.
    pub fn search(&self, table: &TableName, filter: &SearchFilter) -> Search {
        let today = chrono::Local::now().date_naive();
        let (start, end) = filter.between.clone().unwrap_or_default().resolve(today);
        let quoted = table.quoted();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM {quoted}
             WHERE (?1 IS NULL OR instr(vehicle, ?1) > 0)
               AND (?2 IS NULL OR instr(driver, ?2) > 0)
               AND dt BETWEEN ?3 AND ?4
             ORDER BY id"
        );
        debug!(
            "Search {}: vehicle={:?} driver={:?} between {}..={}",
            table,
            filter.vehicle_pattern(),
            filter.driver_pattern(),
            start,
            end
        );

        Search {
            pool: self.pool.clone(),
            sql,
            vehicle: filter.vehicle_pattern().map(str::to_string),
            driver: filter.driver_pattern().map(str::to_string),
            start,
            end,
        }
    }

    /// Rows sharing `(dt, position, speed, longitude, latitude)`, largest groups first
    pub async fn find_duplicates(
        &self,
        table: &TableName,
    ) -> Result<Vec<DuplicateGroup>, GpsReaderError> {
        let quoted = table.quoted();
        let groups = sqlx::query_as::<_, DuplicateGroup>(&format!(
            "SELECT dt, position, speed, longitude, latitude,
                    COUNT(*) AS count, MIN(id) AS keep_id
             FROM {quoted}
             GROUP BY dt, position, speed, longitude, latitude
             HAVING COUNT(*) > 1
             ORDER BY count DESC, keep_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }

    /// Keep only the lowest identifier of every duplicate group
    pub async fn drop_duplicates(&self, table: &TableName) -> Result<u64, GpsReaderError> {
        let quoted = table.quoted();
        let result = sqlx::query(&format!(
            "DELETE FROM {quoted}
             WHERE id NOT IN (
                SELECT MIN(id) FROM {quoted}
                GROUP BY dt, position, speed, longitude, latitude
             )"
        ))
        .execute(&self.pool)
        .await?;

        let dropped = result.rows_affected();
        info!("Duplicates dropped - {} rows.", dropped);
        Ok(dropped)
    }

    pub async fn row_count(&self, table: &TableName) -> Result<u64, GpsReaderError> {
        let quoted = table.quoted();
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {quoted}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Column names in storage order. Fails if the table does not exist.
    pub async fn column_names(&self, table: &TableName) -> Result<Vec<String>, GpsReaderError> {
        Ok(self
            .table_columns(table)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    pub async fn table_names(&self) -> Result<Vec<String>, GpsReaderError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    /// Tables of the database with their columns and row counts
    pub async fn info(&self) -> Result<DatabaseInfo, GpsReaderError> {
        let mut tables = Vec::new();
        for name in self.table_names().await? {
            let table = TableName::new(&name)?;
            tables.push(TableInfo {
                row_count: self.row_count(&table).await?,
                columns: self.table_columns(&table).await?,
                name,
            });
        }
        Ok(DatabaseInfo {
            path: self.path.clone(),
            tables,
        })
    }

    async fn table_columns(&self, table: &TableName) -> Result<Vec<ColumnInfo>, GpsReaderError> {
        let quoted = table.quoted();
        // Surfaces "no such table" for missing tables
        sqlx::query(&format!("SELECT * FROM {quoted} LIMIT 0"))
            .execute(&self.pool)
            .await?;

        let columns = sqlx::query_as::<_, (String, String, bool, bool)>(
            r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1) ORDER BY cid"#,
        )
        .bind(table.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(name, data_type, not_null, primary_key)| ColumnInfo {
            name,
            data_type,
            not_null,
            primary_key,
        })
        .collect();
        Ok(columns)
    }
}

/// Open transaction returned by [`Database::begin_transaction`]
pub struct Batch {
    tx: Transaction<'static, Sqlite>,
    inserted: u64,
}

impl Batch {
    /// Append fixes inside this transaction
    pub async fn insert_rows(
        &mut self,
        table: &TableName,
        rows: &[NewGpsFix],
    ) -> Result<u64, GpsReaderError> {
        let quoted = table.quoted();
        let sql = format!(
            "INSERT INTO {quoted} ({SELECT_COLUMNS})
             VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        );

        let mut inserted = 0;
        for row in rows {
            inserted += insert_fix(&mut self.tx, &sql, row).await?;
        }
        self.inserted += inserted;
        Ok(inserted)
    }

    /// Commit, returning the number of rows inserted through this batch
    pub async fn commit(self) -> Result<u64, GpsReaderError> {
        let Self { tx, inserted } = self;
        tx.commit().await?;
        debug!("Transaction committed, {} rows inserted", inserted);
        Ok(inserted)
    }

    pub async fn rollback(self) -> Result<(), GpsReaderError> {
        let Self { tx, inserted } = self;
        tx.rollback().await?;
        debug!("Transaction rolled back, {} rows discarded", inserted);
        Ok(())
    }
}

/// Insert a single fix
async fn insert_fix(
    tx: &mut Transaction<'static, Sqlite>,
    sql: &str,
    fix: &NewGpsFix,
) -> Result<u64, GpsReaderError> {
    let result = sqlx::query(sql)
        .bind(&fix.dt)
        .bind(&fix.vehicle)
        .bind(&fix.driver)
        .bind(&fix.position)
        .bind(&fix.country)
        .bind(fix.speed)
        .bind(fix.mileage)
        .bind(fix.ignition_status)
        .bind(fix.engine_status)
        .bind(fix.longitude)
        .bind(fix.latitude)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// Pending search over one table.
///
/// Every call to [`Search::fetch`] opens a new cursor. A returned stream is
/// single pass and cannot be rewound.
pub struct Search {
    pool: SqlitePool,
    sql: String,
    vehicle: Option<String>,
    driver: Option<String>,
    start: String,
    end: String,
}

impl Search {
    /// Lazily stream the matching fixes in store order
    pub fn fetch(&self) -> BoxStream<'_, Result<GpsFix, GpsReaderError>> {
        sqlx::query_as::<_, FixRow>(&self.sql)
            .bind(self.vehicle.as_deref())
            .bind(self.driver.as_deref())
            .bind(self.start.as_str())
            .bind(self.end.as_str())
            .fetch(&self.pool)
            .map_ok(GpsFix::from)
            .map_err(GpsReaderError::from)
            .boxed()
    }

    pub async fn fetch_all(&self) -> Result<Vec<GpsFix>, GpsReaderError> {
        self.fetch().try_collect().await
    }

    /// Effective inclusive date bounds
    pub fn bounds(&self) -> (&str, &str) {
        (&self.start, &self.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: String,
    pub row_count: u64,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInfo {
    pub path: PathBuf,
    pub tables: Vec<TableInfo>,
}

impl fmt::Display for DatabaseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = format!("Database: {}", self.path.display());
        let rule = "=".repeat(title.len());
        writeln!(f, "{rule}\n{title}\n{rule}")?;
        if self.tables.is_empty() {
            return writeln!(f, "Database is empty.");
        }
        writeln!(f, "tables:")?;
        for table in &self.tables {
            writeln!(f, "   {}", table.name)?;
        }
        for table in &self.tables {
            writeln!(f, "\n{} table ({} rows):", table.name, table.row_count)?;
            writeln!(f, "   {:<16} {:<10} {:<8} {:<3}", "name", "type", "notnull", "pk")?;
            for column in &table.columns {
                writeln!(
                    f,
                    "   {:<16} {:<10} {:<8} {:<3}",
                    column.name,
                    column.data_type,
                    u8::from(column.not_null),
                    u8::from(column.primary_key)
                )?;
            }
            writeln!(f, "{}", "=".repeat(50))?;
        }
        Ok(())
    }
}
