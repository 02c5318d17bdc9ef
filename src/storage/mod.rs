//! Persistence of run results
//!
//! Two independent sinks:
//! - the snapshot table, replaced atomically ([`repository`])
//! - a flat JSON backup, best effort ([`backup`])
//!
//! [`persist_run`] writes both concurrently and reports each outcome on its
//! own; a failing snapshot replace does not affect the backup and vice versa.

pub mod backup;
pub mod repository;

use std::path::Path;

use crate::metrics;
use crate::models::ScrapeResult;
use crate::utils::error::StorageError;

pub use backup::{read_backup, write_backup};
pub use repository::{
    open_store, MemorySnapshotStore, PostgresSnapshotStore, SharedSnapshotStore, SnapshotStore,
    SqliteSnapshotStore,
};

/// Outcome of persisting one run
#[derive(Debug)]
pub struct PersistReport {
    /// Rows written to the backup file; `None` when no backup was requested
    pub backup: Option<Result<usize, StorageError>>,

    /// Rows in the new snapshot; `None` when no store was configured
    pub snapshot: Option<Result<usize, StorageError>>,
}

impl PersistReport {
    /// True when the snapshot was requested and failed
    pub fn snapshot_failed(&self) -> bool {
        matches!(self.snapshot, Some(Err(_)))
    }

    pub fn backup_failed(&self) -> bool {
        matches!(self.backup, Some(Err(_)))
    }
}

/// Write the backup and replace the snapshot concurrently
pub async fn persist_run(
    store: Option<&dyn SnapshotStore>,
    backup_path: Option<&Path>,
    results: &[ScrapeResult],
) -> PersistReport {
    let backup_job = async {
        match backup_path {
            Some(path) => Some(write_backup(path, results).await),
            None => None,
        }
    };

    let snapshot_job = async {
        match store {
            Some(store) => Some(replace_snapshot(store, results).await),
            None => None,
        }
    };

    let (backup, snapshot) = tokio::join!(backup_job, snapshot_job);

    if let Some(Err(e)) = &backup {
        tracing::error!(error = %e, "Backup write failed");
    }

    PersistReport { backup, snapshot }
}

async fn replace_snapshot(
    store: &dyn SnapshotStore,
    results: &[ScrapeResult],
) -> Result<usize, StorageError> {
    let outcome = match store.ensure_schema().await {
        Ok(()) => store.replace(results).await,
        Err(e) => Err(e),
    };

    match &outcome {
        Ok(rows) => metrics::record_snapshot(Some(*rows)),
        Err(e) => {
            metrics::record_snapshot(None);
            tracing::error!(
                target_db = %store.describe(),
                error = %e,
                "Snapshot replace failed, previous snapshot kept"
            );
        }
    }
    outcome
}
