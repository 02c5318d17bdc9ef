//! Unified error handling for the fillrate crate
//!
//! Domain modules return their own error types. This module wraps them in a
//! single `Error` for callers that cross module boundaries, plus a category
//! used to decide how a failure is reported.
//!
//! # Architecture
//!
//! - [`FillRateErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use std::io;
use thiserror::Error;

pub use crate::analytics::FillRateError;
pub use crate::utils::error::{FetchError, RouteListError, StorageError};

/// Common trait for all fillrate error types
pub trait FillRateErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Short user-facing description
    fn description(&self) -> String;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Navigation, timeouts and blocked pages
    Fetch,
    /// Seat extraction and metric computation
    Extraction,
    /// Snapshot store and backup file
    Storage,
    /// Route list and other inputs
    Input,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch error",
            Self::Extraction => "extraction error",
            Self::Storage => "storage error",
            Self::Input => "input error",
            Self::Config => "configuration error",
            Self::Other => "error",
        }
    }
}

/// Unified error type for the fillrate crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Route list error: {0}")]
    Routes(#[from] RouteListError),

    #[error("Fill rate error: {0}")]
    FillRate(#[from] FillRateError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl FillRateErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Storage(e) => e.is_recoverable(),
            Self::Routes(_) | Self::FillRate(_) => false,
            Self::Io(_) => true,
            Self::Json(_) | Self::Config(_) | Self::Other { .. } => false,
        }
    }

    fn description(&self) -> String {
        format!("{}: {self}", self.category().label())
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(FetchError::Blocked) => ErrorCategory::Extraction,
            Self::Fetch(_) => ErrorCategory::Fetch,
            Self::FillRate(_) => ErrorCategory::Extraction,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Routes(_) | Self::Json(_) => ErrorCategory::Input,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

}

/// Recovers the typed error behind an `anyhow` chain, so the CLI can report
/// a category. Context added along the way is dropped for typed errors.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<Error>() {
            Ok(e) => return e,
            Err(err) => err,
        };
        let err = match err.downcast::<FetchError>() {
            Ok(e) => return Self::Fetch(e),
            Err(err) => err,
        };
        let err = match err.downcast::<StorageError>() {
            Ok(e) => return Self::Storage(e),
            Err(err) => err,
        };
        let err = match err.downcast::<RouteListError>() {
            Ok(e) => return Self::Routes(e),
            Err(err) => err,
        };
        let err = match err.downcast::<io::Error>() {
            Ok(e) => return Self::Io(e),
            Err(err) => err,
        };

        Self::Other {
            context: format!("{err:#}"),
            source: Some(err.into()),
        }
    }
}
