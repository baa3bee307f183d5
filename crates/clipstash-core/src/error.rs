//! Error types module
//!
//! All errors that reach a caller of the upload path are unified under [`AppError`].
//! Each variant maps onto one class of the taxonomy: validation (the client's fault),
//! integrity (digest mismatch, client must re-upload), storage (operator-actionable),
//! database (record commit failed) and tool configuration.
//!
//! The `Database` variant wraps `sqlx::Error` when the `sqlx` feature is enabled.
//! Without it the variant carries a message instead.

use std::fmt;
use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
/// This trait allows errors to self-describe their response characteristics
pub trait ErrorMetadata {
    /// HTTP-equivalent status code
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "INTEGRITY_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried as-is)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client or operator
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Closed set of storage failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    /// Target directory does not exist (volume not mounted or path misconfigured).
    NotMounted,
    /// Target path exists but is not a directory.
    NotADirectory,
    PermissionDenied,
    /// Free space minus the requested size is below the safety margin.
    InsufficientSpace,
    /// The filesystem ran out of space in the middle of a write.
    DiskFull,
    WriteFailed,
}

impl StorageErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageErrorKind::NotMounted => "not_mounted",
            StorageErrorKind::NotADirectory => "not_a_directory",
            StorageErrorKind::PermissionDenied => "permission_denied",
            StorageErrorKind::InsufficientSpace => "insufficient_space",
            StorageErrorKind::DiskFull => "disk_full",
            StorageErrorKind::WriteFailed => "write_failed",
        }
    }

    /// Operator remediation hint for this kind of failure.
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            StorageErrorKind::NotMounted => {
                "Check that the storage volume is mounted and STORAGE_ROOT points at it"
            }
            StorageErrorKind::NotADirectory => {
                "STORAGE_ROOT or one of its media subdirectories is a file; point it at a directory"
            }
            StorageErrorKind::PermissionDenied => {
                "Grant the service user write access to the storage directory"
            }
            StorageErrorKind::InsufficientSpace | StorageErrorKind::DiskFull => {
                "Free disk space or grow the volume, then retry the upload"
            }
            StorageErrorKind::WriteFailed => "Inspect the server logs for the underlying I/O error",
        }
    }
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upload session not found: {0}")]
    SessionNotFound(String),

    #[error("Integrity error: expected sha256 {expected}, computed {actual}")]
    Integrity { expected: String, actual: String },

    #[error("Storage error ({kind}): {message}")]
    Storage {
        kind: StorageErrorKind,
        message: String,
    },

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Media tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Validation(_) => (
            400,
            "VALIDATION_ERROR",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::SessionNotFound(_) => (
            404,
            "UPLOAD_SESSION_NOT_FOUND",
            false,
            Some("Start a new upload session"),
            false,
            LogLevel::Debug,
        ),
        AppError::Integrity { .. } => (
            422,
            "INTEGRITY_ERROR",
            false,
            Some("Re-upload the file; the received bytes do not match the declared digest"),
            false,
            LogLevel::Warn,
        ),
        AppError::Storage { kind, .. } => {
            let (status, code, recoverable) = match kind {
                StorageErrorKind::InsufficientSpace | StorageErrorKind::DiskFull => {
                    (507, "INSUFFICIENT_STORAGE", true)
                }
                StorageErrorKind::NotMounted | StorageErrorKind::NotADirectory => {
                    (503, "STORAGE_UNAVAILABLE", true)
                }
                StorageErrorKind::PermissionDenied => (500, "STORAGE_PERMISSION_DENIED", false),
                StorageErrorKind::WriteFailed => (500, "STORAGE_WRITE_FAILED", true),
            };
            (
                status,
                code,
                recoverable,
                Some(kind.remediation_hint()),
                true,
                LogLevel::Error,
            )
        }
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::ToolUnavailable(_) => (
            500,
            "TOOL_UNAVAILABLE",
            false,
            Some("Install ffmpeg/ffprobe or set FFMPEG_PATH and FFPROBE_PATH"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Validation(_) => "Validation",
            AppError::SessionNotFound(_) => "SessionNotFound",
            AppError::Integrity { .. } => "Integrity",
            AppError::Storage { .. } => "Storage",
            AppError::Database(_) => "Database",
            AppError::ToolUnavailable(_) => "ToolUnavailable",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Storage failure kind, if this is a storage error.
    pub fn storage_kind(&self) -> Option<StorageErrorKind> {
        match self {
            AppError::Storage { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Validation(ref msg) => msg.clone(),
            AppError::SessionNotFound(ref id) => format!("Upload session not found: {}", id),
            AppError::Integrity { .. } => {
                "Uploaded content does not match the declared digest".to_string()
            }
            AppError::Storage { kind, .. } => match kind {
                StorageErrorKind::InsufficientSpace | StorageErrorKind::DiskFull => {
                    "Not enough storage space to accept this upload".to_string()
                }
                _ => "Failed to store the upload".to_string(),
            },
            AppError::Database(_) => "Failed to record the upload".to_string(),
            AppError::ToolUnavailable(_) => "Media processing is not available".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_validation() {
        let err = AppError::Validation("bad kind".to_string());
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "bad kind");
        assert!(!err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_error_metadata_integrity_is_not_retried() {
        let err = AppError::Integrity {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(err.http_status_code(), 422);
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("aa"));
        assert!(err.to_string().contains("bb"));
    }

    #[test]
    fn test_error_metadata_insufficient_space() {
        let err = AppError::Storage {
            kind: StorageErrorKind::InsufficientSpace,
            message: "0 bytes available".to_string(),
        };
        assert_eq!(err.http_status_code(), 507);
        assert_eq!(err.error_code(), "INSUFFICIENT_STORAGE");
        assert!(err.is_recoverable());
        assert_eq!(
            err.suggested_action(),
            Some(StorageErrorKind::InsufficientSpace.remediation_hint())
        );
        assert_eq!(err.storage_kind(), Some(StorageErrorKind::InsufficientSpace));
    }

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_sensitive());
        assert_eq!(err.client_message(), "Failed to record the upload");
    }

    #[test]
    fn test_storage_kind_display() {
        assert_eq!(StorageErrorKind::DiskFull.to_string(), "disk_full");
        assert_eq!(StorageErrorKind::NotMounted.as_str(), "not_mounted");
    }
}
