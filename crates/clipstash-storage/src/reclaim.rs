use clipstash_core::constants::{PROBE_FILE_PREFIX, TEMP_FILE_PREFIX};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;

use crate::error::{StorageError, StorageResult};

/// Delete reserved-prefix temp and probe files in `directory` older than `older_than`.
///
/// A missing directory reclaims nothing. Returns the number of files removed.
pub async fn reclaim_stale_temp_files(directory: &Path, older_than: Duration) -> StorageResult<usize> {
    let mut entries = match fs::read_dir(directory).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StorageError::from_io(e, directory, "Failed to list directory")),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::from_io(e, directory, "Failed to list directory"))?
    {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(TEMP_FILE_PREFIX) && !name.starts_with(PROBE_FILE_PREFIX) {
            continue;
        }

        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < older_than {
            continue;
        }

        match fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(
                path = %entry.path().display(),
                error = %e,
                "Failed to remove stale temporary file"
            ),
        }
    }

    if removed > 0 {
        tracing::info!(
            directory = %directory.display(),
            removed = removed,
            "Reclaimed stale temporary files"
        );
    }

    Ok(removed)
}
