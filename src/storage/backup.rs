//! Flat JSON backup of a run
//!
//! The backup is written next to a temporary file and renamed into place, so
//! readers see either the previous backup or the new one in full.

use std::path::{Path, PathBuf};

use crate::models::ScrapeResult;
use crate::utils::error::StorageError;

/// Write `results` as pretty-printed JSON to `path`
pub async fn write_backup(path: &Path, results: &[ScrapeResult]) -> Result<usize, StorageError> {
    let body = serde_json::to_vec_pretty(results)
        .map_err(|e| StorageError::Backup(format!("serialize: {e}")))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Backup(format!("{}: {e}", parent.display())))?;
        }
    }

    let staging = staging_path(path);
    tokio::fs::write(&staging, &body)
        .await
        .map_err(|e| StorageError::Backup(format!("{}: {e}", staging.display())))?;

    if let Err(e) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(StorageError::Backup(format!("{}: {e}", path.display())));
    }

    tracing::info!(path = %path.display(), rows = results.len(), "Backup written");
    Ok(results.len())
}

/// Read a backup written by [`write_backup`]
pub async fn read_backup(path: &Path) -> Result<Vec<ScrapeResult>, StorageError> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|e| StorageError::Backup(format!("{}: {e}", path.display())))?;

    serde_json::from_slice(&body).map_err(|e| StorageError::Backup(format!("parse: {e}")))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
