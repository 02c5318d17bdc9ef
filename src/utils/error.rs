//! Error types for the fillrate scraper
//!
//! This module defines the domain error types used throughout the application.

use thiserror::Error;

/// Errors that can occur while driving a rendering session for one task
#[derive(Error, Debug)]
pub enum FetchError {
    /// Navigation failed (network error, bad response, browser error)
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Navigation did not finish within the configured timeout
    #[error("Navigation timed out after {0}s")]
    Timeout(u64),

    /// Page loaded but no seat-availability signal was found
    #[error("Blocked: no seat information on page")]
    Blocked,

    /// Rendering session could not be opened or driven
    #[error("Session error: {0}")]
    Session(String),

    /// The run deadline fired while the task was in progress
    #[error("Cancelled by run deadline")]
    Cancelled,

    /// Every attempt failed
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl FetchError {
    /// Transient faults are retried by the fetcher
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::RetriesExhausted { .. } | Self::Cancelled)
    }

    /// Short machine-friendly label, used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Navigation(_) => "navigation",
            Self::Timeout(_) => "timeout",
            Self::Blocked => "blocked",
            Self::Session(_) => "session",
            Self::Cancelled => "cancelled",
            Self::RetriesExhausted { .. } => "exhausted",
        }
    }
}

/// Errors raised by snapshot persistence
#[derive(Error, Debug)]
pub enum StorageError {
    /// Could not obtain a connection
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A statement inside the replace transaction failed; the transaction was rolled back
    #[error("Transaction failed, snapshot left unchanged: {0}")]
    Transaction(String),

    /// Row value does not fit the snapshot schema
    #[error("Invalid row for {route} on {date}: {reason}")]
    InvalidRow {
        route: String,
        date: String,
        reason: String,
    },

    /// Backup file could not be written or read
    #[error("Backup error: {0}")]
    Backup(String),
}

impl StorageError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<tokio_postgres::Error> for StorageError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Transaction(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for StorageError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Transaction(err.to_string())
    }
}

/// Errors while loading the route list
#[derive(Error, Debug)]
pub enum RouteListError {
    /// File could not be opened or read
    #[error("Failed to read route list: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV
    #[error("Malformed route list: {0}")]
    Csv(#[from] csv::Error),

    /// Required header missing
    #[error("Route list is missing the '{0}' column")]
    MissingColumn(&'static str),

    /// A row has an unusable URL
    #[error("Invalid URL for route '{route}': {url}")]
    InvalidUrl { route: String, url: String },
}
