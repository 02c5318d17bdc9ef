//! Snapshot store abstraction
//!
//! The snapshot table always holds the results of the most recent completed
//! run. Writing is a single replace-all transaction: delete every row, insert
//! the new result set, commit. A failure at any step rolls back and leaves
//! the previous snapshot untouched.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      persist_run                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SnapshotStore trait                      │
//! └─────────────────────────────────────────────────────────────┘
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │   PostgreSQL    │ │     SQLite      │ │     Memory      │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use rusqlite::{params, Connection};
use tokio_postgres::config::SslMode;
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::config::{is_sql_identifier, DatabaseConfig};
use crate::models::{ScrapeResult, TRAVEL_DATE_FORMAT};
use crate::utils::error::StorageError;

/// Column list shared by every backend, in insert order
const COLUMNS: &str = "route_name, travel_date, route_url, bus_count, total_capacity, \
                       available_seats, filled_seats, fill_rate_percent, scraped_at";

// ============================================================================
// Repository Trait
// ============================================================================

/// Durable snapshot of the latest run
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Create the snapshot table if it does not exist
    async fn ensure_schema(&self) -> Result<(), StorageError>;

    /// Atomically replace the whole snapshot with `results`.
    ///
    /// Returns the number of rows written.
    async fn replace(&self, results: &[ScrapeResult]) -> Result<usize, StorageError>;

    /// Read the current snapshot, ordered by route then date
    async fn load(&self) -> Result<Vec<ScrapeResult>, StorageError>;

    /// Human-readable target, for logs
    fn describe(&self) -> String;
}

/// Thread-safe shared store
pub type SharedSnapshotStore = Arc<dyn SnapshotStore>;

fn checked_table(table: &str) -> Result<String, StorageError> {
    if is_sql_identifier(table) {
        Ok(table.to_string())
    } else {
        Err(StorageError::Connection(format!(
            "Invalid snapshot table name: {table}"
        )))
    }
}

fn invalid_row(result: &ScrapeResult, reason: impl Into<String>) -> StorageError {
    StorageError::InvalidRow {
        route: result.route_name.clone(),
        date: result.travel_date.format(TRAVEL_DATE_FORMAT).to_string(),
        reason: reason.into(),
    }
}

// ============================================================================
// PostgreSQL Implementation
// ============================================================================

/// PostgreSQL snapshot store over a deadpool connection pool
pub struct PostgresSnapshotStore {
    pool: Pool,
    table: String,
}

/// Counts as bound to INTEGER columns
struct PgCounts {
    bus_count: i32,
    total_capacity: i32,
    available_seats: i32,
    filled_seats: i32,
}

impl PgCounts {
    fn try_from_result(result: &ScrapeResult) -> Result<Self, StorageError> {
        let int = |value: u32, column: &str| {
            i32::try_from(value)
                .map_err(|_| invalid_row(result, format!("{column} {value} exceeds INTEGER")))
        };

        Ok(Self {
            bus_count: int(result.bus_count, "bus_count")?,
            total_capacity: int(result.total_capacity, "total_capacity")?,
            available_seats: int(result.available_seats, "available_seats")?,
            filled_seats: int(result.filled_seats, "filled_seats")?,
        })
    }
}

impl PostgresSnapshotStore {
    /// Create the connection pool. Connections are opened lazily.
    pub fn new(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let table = checked_table(&config.table)?;

        let mut cfg = PoolConfig::new();
        cfg.url = Some(config.url.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.pool_size.max(1)));

        let pool = if tls_required(&config.url)? {
            cfg.create_pool(Some(Runtime::Tokio1), rustls_connector()?)
        } else {
            cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        }
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self { pool, table })
    }
}

/// Everything but `sslmode=disable` negotiates TLS; `prefer` (the default)
/// falls back to plain text when the server declines.
fn tls_required(url: &str) -> Result<bool, StorageError> {
    let parsed: tokio_postgres::Config = url
        .parse()
        .map_err(|e| StorageError::Connection(format!("Invalid database URL: {e}")))?;
    Ok(!matches!(parsed.get_ssl_mode(), SslMode::Disable))
}

/// rustls connector trusting the platform's root certificates
fn rustls_connector() -> Result<MakeRustlsConnect, StorageError> {
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        tracing::warn!(error = %e, "Skipping unreadable root certificate");
    }

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    tracing::debug!(added, ignored, "Loaded root certificates");

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let tls = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| StorageError::Connection(format!("TLS setup failed: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(MakeRustlsConnect::new(tls))
}

#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    route_name TEXT NOT NULL,
                    travel_date DATE NOT NULL,
                    route_url TEXT NOT NULL,
                    bus_count INTEGER NOT NULL,
                    total_capacity INTEGER NOT NULL,
                    available_seats INTEGER NOT NULL,
                    filled_seats INTEGER NOT NULL,
                    fill_rate_percent NUMERIC(5, 2) NOT NULL,
                    scraped_at TIMESTAMP NOT NULL
                )",
                self.table
            ))
            .await?;
        Ok(())
    }

    async fn replace(&self, results: &[ScrapeResult]) -> Result<usize, StorageError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let deleted = tx
            .execute(&format!("DELETE FROM {}", self.table), &[])
            .await?;

        let insert = tx
            .prepare(&format!(
                "INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8::FLOAT8, $9)",
                self.table
            ))
            .await?;

        // Any early return drops `tx`, which rolls back.
        for result in results {
            let counts = PgCounts::try_from_result(result)?;
            let scraped_at = result.scraped_at.naive_utc();
            tx.execute(
                &insert,
                &[
                    &result.route_name,
                    &result.travel_date,
                    &result.route_url,
                    &counts.bus_count,
                    &counts.total_capacity,
                    &counts.available_seats,
                    &counts.filled_seats,
                    &result.fill_rate_percent,
                    &scraped_at,
                ],
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            table = %self.table,
            deleted,
            inserted = results.len(),
            "Snapshot replaced"
        );
        Ok(results.len())
    }

    async fn load(&self) -> Result<Vec<ScrapeResult>, StorageError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT route_name, travel_date, route_url, bus_count, total_capacity, \
                     available_seats, filled_seats, fill_rate_percent::FLOAT8, scraped_at \
                     FROM {} ORDER BY route_name, travel_date",
                    self.table
                ),
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| {
                let route_name: String = row.get(0);
                let travel_date: NaiveDate = row.get(1);
                let count = |idx: usize| {
                    let value: i32 = row.get(idx);
                    u32::try_from(value).map_err(|_| StorageError::InvalidRow {
                        route: route_name.clone(),
                        date: travel_date.format(TRAVEL_DATE_FORMAT).to_string(),
                        reason: format!("negative count {value}"),
                    })
                };
                let scraped_at: NaiveDateTime = row.get(8);

                Ok(ScrapeResult {
                    route_url: row.get(2),
                    bus_count: count(3)?,
                    total_capacity: count(4)?,
                    available_seats: count(5)?,
                    filled_seats: count(6)?,
                    fill_rate_percent: row.get(7),
                    scraped_at: scraped_at.and_utc(),
                    route_name: route_name.clone(),
                    travel_date,
                })
            })
            .collect()
    }

    fn describe(&self) -> String {
        format!("postgres:{}", self.table)
    }
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite snapshot store
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
    table: String,
    label: String,
}

impl SqliteSnapshotStore {
    /// Open (or create) a SQLite database file
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, StorageError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Connection(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        tracing::info!(path = %path.display(), "SQLite snapshot store opened");
        Self::with_connection(conn, table, format!("sqlite:{}", path.display()))
    }

    /// In-memory store
    pub fn in_memory(table: &str) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, table, String::from("sqlite::memory:"))
    }

    fn with_connection(conn: Connection, table: &str, label: String) -> Result<Self, StorageError> {
        Ok(Self {
            conn: Mutex::new(conn),
            table: checked_table(table)?,
            label,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Connection(String::from("SQLite connection poisoned")))
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                route_name TEXT NOT NULL,
                travel_date TEXT NOT NULL,
                route_url TEXT NOT NULL,
                bus_count INTEGER NOT NULL CHECK (bus_count >= 0),
                total_capacity INTEGER NOT NULL CHECK (total_capacity >= 0),
                available_seats INTEGER NOT NULL CHECK (available_seats >= 0),
                filled_seats INTEGER NOT NULL CHECK (filled_seats >= 0),
                fill_rate_percent REAL NOT NULL
                    CHECK (fill_rate_percent >= 0 AND fill_rate_percent <= 100),
                scraped_at TEXT NOT NULL
            );",
            self.table
        ))?;
        Ok(())
    }

    fn replace_rows(&self, results: &[ScrapeResult]) -> Result<usize, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let deleted = tx.execute(&format!("DELETE FROM {}", self.table), [])?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                self.table
            ))?;

            for result in results {
                insert.execute(params![
                    result.route_name,
                    result.travel_date,
                    result.route_url,
                    result.bus_count,
                    result.total_capacity,
                    result.available_seats,
                    result.filled_seats,
                    result.fill_rate_percent,
                    result.scraped_at,
                ])?;
            }
        }
        tx.commit()?;

        tracing::info!(
            target_db = %self.label,
            deleted,
            inserted = results.len(),
            "Snapshot replaced"
        );
        Ok(results.len())
    }

    fn load_rows(&self) -> Result<Vec<ScrapeResult>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM {} ORDER BY route_name, travel_date",
            self.table
        ))?;

        let rows = stmt.query_map([], |row| {
            Ok(ScrapeResult {
                route_name: row.get(0)?,
                travel_date: row.get(1)?,
                route_url: row.get(2)?,
                bus_count: row.get(3)?,
                total_capacity: row.get(4)?,
                available_seats: row.get(5)?,
                filled_seats: row.get(6)?,
                fill_rate_percent: row.get(7)?,
                scraped_at: row.get::<_, DateTime<Utc>>(8)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        self.create_schema()
    }

    async fn replace(&self, results: &[ScrapeResult]) -> Result<usize, StorageError> {
        self.replace_rows(results)
    }

    async fn load(&self) -> Result<Vec<ScrapeResult>, StorageError> {
        self.load_rows()
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

// ============================================================================
// Memory Implementation
// ============================================================================

/// In-memory store with optional fault injection
#[derive(Default)]
pub struct MemorySnapshotStore {
    rows: Mutex<Vec<ScrapeResult>>,
    fail_after: Option<usize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose `replace` fails once `rows` rows have been staged
    pub fn failing_after(rows: usize) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail_after: Some(rows),
        }
    }

    /// Store pre-populated with an existing snapshot
    pub fn with_rows(rows: Vec<ScrapeResult>) -> Self {
        Self {
            rows: Mutex::new(rows),
            fail_after: None,
        }
    }

    /// Same rows, but future replaces fail after `rows` staged rows
    pub fn and_fail_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn replace(&self, results: &[ScrapeResult]) -> Result<usize, StorageError> {
        let mut staged = Vec::with_capacity(results.len());
        for result in results {
            if self.fail_after == Some(staged.len()) {
                return Err(StorageError::Transaction(format!(
                    "injected failure after {} rows",
                    staged.len()
                )));
            }
            staged.push(result.clone());
        }

        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StorageError::Connection(String::from("memory store poisoned")))?;
        *rows = staged;
        Ok(rows.len())
    }

    async fn load(&self) -> Result<Vec<ScrapeResult>, StorageError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StorageError::Connection(String::from("memory store poisoned")))?;
        let mut out = rows.clone();
        out.sort_by(|a, b| {
            a.route_name
                .cmp(&b.route_name)
                .then(a.travel_date.cmp(&b.travel_date))
        });
        Ok(out)
    }

    fn describe(&self) -> String {
        String::from("memory")
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Open the store selected by configuration: SQLite when a path is set,
/// PostgreSQL otherwise.
pub fn open_store(config: &DatabaseConfig) -> Result<SharedSnapshotStore, StorageError> {
    match &config.sqlite_path {
        Some(path) => Ok(Arc::new(SqliteSnapshotStore::open(path, &config.table)?)),
        None => Ok(Arc::new(PostgresSnapshotStore::new(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================
