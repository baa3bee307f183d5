//! Storage operation errors

use clipstash_core::{AppError, StorageErrorKind};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure of a storage check or write, classified by [`StorageErrorKind`].
#[derive(Debug, Error)]
#[error("{kind} at {}: {message}", path.display())]
pub struct StorageError {
    pub kind: StorageErrorKind,
    /// Directory or file the operation targeted.
    pub path: PathBuf,
    pub message: String,
    /// Free bytes on the target filesystem, when known (set for space failures).
    pub available_bytes: Option<u64>,
    #[source]
    pub source: Option<io::Error>,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(unix)]
const ENOSPC: i32 = 28;

impl StorageError {
    pub fn new(kind: StorageErrorKind, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
            available_bytes: None,
            source: None,
        }
    }

    /// Wrap an I/O error, classifying it by its kind.
    pub fn from_io(err: io::Error, path: &Path, context: &str) -> Self {
        let kind = classify_io_error(&err);
        Self {
            kind,
            path: path.to_path_buf(),
            message: format!("{}: {}", context, err),
            available_bytes: None,
            source: Some(err),
        }
    }

    pub fn with_available_bytes(mut self, available: Option<u64>) -> Self {
        self.available_bytes = available;
        self
    }

    pub fn is_disk_full(&self) -> bool {
        self.kind == StorageErrorKind::DiskFull
    }
}

/// Map an I/O error onto the storage failure kinds callers can act on.
pub fn classify_io_error(err: &io::Error) -> StorageErrorKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
            StorageErrorKind::PermissionDenied
        }
        io::ErrorKind::StorageFull => StorageErrorKind::DiskFull,
        io::ErrorKind::NotFound => StorageErrorKind::NotMounted,
        _ => {
            #[cfg(unix)]
            if err.raw_os_error() == Some(ENOSPC) {
                return StorageErrorKind::DiskFull;
            }
            StorageErrorKind::WriteFailed
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let mut message = format!("{} ({})", err.message, err.path.display());
        if let Some(available) = err.available_bytes {
            message.push_str(&format!(", {} bytes available", available));
        }
        AppError::Storage {
            kind: err.kind,
            message,
        }
    }
}
