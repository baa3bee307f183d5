//! Pre-write storage health gate.
//!
//! [`StorageHealthChecker::check`] runs, in order: existence, directory type, a write
//! probe (create and delete a marker file) and a free-space check. The first failure
//! is reported. Expected conditions never produce an `Err`; the report carries them.
//!
//! The check is advisory. Another writer can consume the space between the check and
//! the write, so [`crate::AtomicFileWriter`] classifies write failures on its own.

use clipstash_core::constants::PROBE_FILE_PREFIX;
use clipstash_core::{LogLevel, StorageErrorKind};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::space::SpaceProbe;

/// Why a directory failed the health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthFailure {
    PathMissing,
    NotADirectory,
    PermissionDenied { detail: String },
    WriteFailed { detail: String },
    InsufficientSpace {
        available: u64,
        required: u64,
        margin: u64,
    },
}

impl HealthFailure {
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            HealthFailure::PathMissing => StorageErrorKind::NotMounted,
            HealthFailure::NotADirectory => StorageErrorKind::NotADirectory,
            HealthFailure::PermissionDenied { .. } => StorageErrorKind::PermissionDenied,
            HealthFailure::WriteFailed { .. } => StorageErrorKind::WriteFailed,
            HealthFailure::InsufficientSpace { .. } => StorageErrorKind::InsufficientSpace,
        }
    }

    /// Every health failure needs an operator to fix the volume.
    pub fn log_level(&self) -> LogLevel {
        LogLevel::Error
    }
}

impl fmt::Display for HealthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthFailure::PathMissing => f.write_str("directory does not exist"),
            HealthFailure::NotADirectory => f.write_str("path is not a directory"),
            HealthFailure::PermissionDenied { detail } => {
                write!(f, "directory is not writable: {}", detail)
            }
            HealthFailure::WriteFailed { detail } => write!(f, "write probe failed: {}", detail),
            HealthFailure::InsufficientSpace {
                available,
                required,
                margin,
            } => write!(
                f,
                "{} bytes available, {} required plus {} safety margin",
                available, required, margin
            ),
        }
    }
}

/// Outcome of one health check. Produced fresh per write attempt, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageHealthReport {
    pub directory: PathBuf,
    pub failure: Option<HealthFailure>,
}

impl StorageHealthReport {
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    pub fn kind(&self) -> Option<StorageErrorKind> {
        self.failure.as_ref().map(HealthFailure::kind)
    }

    pub fn into_result(self) -> StorageResult<()> {
        match self.failure {
            None => Ok(()),
            Some(failure) => {
                let available = match failure {
                    HealthFailure::InsufficientSpace { available, .. } => Some(available),
                    _ => None,
                };
                Err(
                    StorageError::new(failure.kind(), self.directory, failure.to_string())
                        .with_available_bytes(available),
                )
            }
        }
    }
}

#[derive(Clone)]
pub struct StorageHealthChecker {
    space: Arc<dyn SpaceProbe>,
    safety_margin_bytes: u64,
}

impl StorageHealthChecker {
    pub fn new(space: Arc<dyn SpaceProbe>, safety_margin_bytes: u64) -> Self {
        Self {
            space,
            safety_margin_bytes,
        }
    }

    pub fn safety_margin_bytes(&self) -> u64 {
        self.safety_margin_bytes
    }

    /// Check that `directory` can take `required_bytes` more while keeping the margin free.
    pub async fn check(&self, directory: &Path, required_bytes: u64) -> StorageHealthReport {
        let failure = self.first_failure(directory, required_bytes).await;

        if let Some(failure) = &failure {
            match failure.log_level() {
                LogLevel::Error => tracing::error!(
                    directory = %directory.display(),
                    required_bytes = required_bytes,
                    kind = %failure.kind(),
                    detail = %failure,
                    "Storage health check failed"
                ),
                LogLevel::Warn => tracing::warn!(
                    directory = %directory.display(),
                    required_bytes = required_bytes,
                    kind = %failure.kind(),
                    detail = %failure,
                    "Storage health check failed"
                ),
                LogLevel::Debug => tracing::debug!(
                    directory = %directory.display(),
                    kind = %failure.kind(),
                    detail = %failure,
                    "Storage health check failed"
                ),
            }
        }

        StorageHealthReport {
            directory: directory.to_path_buf(),
            failure,
        }
    }

    async fn first_failure(&self, directory: &Path, required_bytes: u64) -> Option<HealthFailure> {
        match fs::metadata(directory).await {
            Ok(meta) if !meta.is_dir() => return Some(HealthFailure::NotADirectory),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Some(HealthFailure::PathMissing),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Some(HealthFailure::PermissionDenied {
                    detail: e.to_string(),
                })
            }
            Err(e) => {
                return Some(HealthFailure::WriteFailed {
                    detail: e.to_string(),
                })
            }
        }

        if let Err(failure) = write_probe(directory).await {
            return Some(failure);
        }

        let available = match self.space.available_bytes(directory).await {
            Ok(available) => available,
            Err(e) => {
                return Some(HealthFailure::WriteFailed {
                    detail: format!("free space lookup failed: {}", e),
                })
            }
        };

        if available < required_bytes.saturating_add(self.safety_margin_bytes) {
            return Some(HealthFailure::InsufficientSpace {
                available,
                required: required_bytes,
                margin: self.safety_margin_bytes,
            });
        }

        None
    }
}

async fn write_probe(directory: &Path) -> Result<(), HealthFailure> {
    let marker = directory.join(format!("{}{}", PROBE_FILE_PREFIX, Uuid::new_v4().simple()));

    let created = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker)
        .await;

    match created {
        Ok(file) => {
            drop(file);
            if let Err(e) = fs::remove_file(&marker).await {
                tracing::warn!(
                    marker = %marker.display(),
                    error = %e,
                    "Failed to remove storage probe marker"
                );
            }
            Ok(())
        }
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem
            ) =>
        {
            Err(HealthFailure::PermissionDenied {
                detail: e.to_string(),
            })
        }
        Err(e) => Err(HealthFailure::WriteFailed {
            detail: e.to_string(),
        }),
    }
}
