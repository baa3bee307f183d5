use clipstash_core::AppError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// External tool failures.
///
/// `NotInstalled` is a configuration problem that affects every file; the rest are
/// per-file failures that degrade a record to "no preview".
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} is not available: {detail}")]
    NotInstalled { tool: String, detail: String },

    #[error("{tool} timed out after {}s", .timeout.as_secs_f64())]
    Timeout { tool: String, timeout: Duration },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("Could not parse {tool} output: {message}")]
    Parse { tool: String, message: String },
}

impl ToolError {
    /// Whether the failure affects every file rather than just this one.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::NotInstalled { .. })
    }
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotInstalled { .. } => AppError::ToolUnavailable(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}
