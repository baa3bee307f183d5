use clipstash_core::PreviewConfig;
use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::error::ToolError;

const DETECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_STDERR_LEN: usize = 2048;

/// First line of each tool's `-version` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersions {
    pub ffmpeg: String,
    pub ffprobe: String,
}

#[derive(Debug, Clone)]
enum Availability {
    Ready(ToolVersions),
    Missing { tool: String, detail: String },
}

/// ffmpeg and ffprobe, detected once on first use.
#[derive(Debug)]
pub struct MediaTools {
    ffmpeg_path: String,
    ffprobe_path: String,
    availability: OnceCell<Availability>,
}

impl MediaTools {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            availability: OnceCell::new(),
        }
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        Self::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone())
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &str {
        &self.ffprobe_path
    }

    /// Versions of both tools, or `NotInstalled` for the first one missing.
    ///
    /// Detection runs once; the result, including a failure, is cached.
    pub async fn versions(&self) -> Result<ToolVersions, ToolError> {
        let availability = self
            .availability
            .get_or_init(|| async { self.detect().await })
            .await;

        match availability {
            Availability::Ready(versions) => Ok(versions.clone()),
            Availability::Missing { tool, detail } => Err(ToolError::NotInstalled {
                tool: tool.clone(),
                detail: detail.clone(),
            }),
        }
    }

    pub async fn ensure_available(&self) -> Result<(), ToolError> {
        self.versions().await.map(|_| ())
    }

    async fn detect(&self) -> Availability {
        let ffmpeg = match version_line(&self.ffmpeg_path).await {
            Ok(version) => version,
            Err(e) => return missing(&self.ffmpeg_path, e),
        };
        let ffprobe = match version_line(&self.ffprobe_path).await {
            Ok(version) => version,
            Err(e) => return missing(&self.ffprobe_path, e),
        };

        tracing::info!(ffmpeg = %ffmpeg, ffprobe = %ffprobe, "Media tools detected");
        Availability::Ready(ToolVersions { ffmpeg, ffprobe })
    }

    pub async fn run_ffmpeg(&self, args: &[String], timeout: Duration) -> Result<Output, ToolError> {
        run_tool(&self.ffmpeg_path, args, timeout).await
    }

    pub async fn run_ffprobe(&self, args: &[String], timeout: Duration) -> Result<Output, ToolError> {
        run_tool(&self.ffprobe_path, args, timeout).await
    }
}

fn missing(tool: &str, err: ToolError) -> Availability {
    tracing::error!(
        tool = %tool,
        error = %err,
        "Media tool unavailable; previews are disabled until it is installed"
    );
    Availability::Missing {
        tool: tool.to_string(),
        detail: err.to_string(),
    }
}

async fn version_line(program: &str) -> Result<String, ToolError> {
    let output = run_tool(program, &["-version".to_string()], DETECT_TIMEOUT).await?;
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

/// Run `program` with `args`, killing it if it outlives `timeout`.
pub async fn run_tool(program: &str, args: &[String], timeout: Duration) -> Result<Output, ToolError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ToolError::NotInstalled {
                tool: program.to_string(),
                detail: e.to_string(),
            },
            _ => ToolError::Io {
                tool: program.to_string(),
                source: e,
            },
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ToolError::Io {
            tool: program.to_string(),
            source: e,
        })?,
        Err(_) => {
            return Err(ToolError::Timeout {
                tool: program.to_string(),
                timeout,
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr: String = stderr.trim().chars().take(MAX_STDERR_LEN).collect();
        return Err(ToolError::Failed {
            tool: program.to_string(),
            status: output.status.to_string(),
            stderr,
        });
    }

    Ok(output)
}
