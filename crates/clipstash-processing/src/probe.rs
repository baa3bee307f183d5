//! Metadata extraction via ffprobe.

use clipstash_core::models::MediaKind;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::ToolError;
use crate::tools::MediaTools;

/// What ffprobe could tell about a file. Every field is optional; screenshots have no
/// duration and some containers omit dimensions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeMetadata {
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        "-select_streams".to_string(),
        "v:0".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

#[tracing::instrument(skip(tools), fields(
    process.executable.name = "ffprobe",
    ffmpeg.operation = "probe"
))]
pub async fn probe(
    tools: &MediaTools,
    path: &Path,
    kind: MediaKind,
    timeout: Duration,
) -> Result<ProbeMetadata, ToolError> {
    let start = Instant::now();
    let output = tools.run_ffprobe(&probe_args(path), timeout).await?;
    let metadata = parse_probe_output(&output.stdout, kind)?;

    tracing::debug!(
        duration_ms = start.elapsed().as_millis(),
        media_duration = ?metadata.duration_secs,
        width = ?metadata.width,
        height = ?metadata.height,
        "Probe completed"
    );

    Ok(metadata)
}

pub fn parse_probe_output(stdout: &[u8], kind: MediaKind) -> Result<ProbeMetadata, ToolError> {
    let probe_data: serde_json::Value =
        serde_json::from_slice(stdout).map_err(|e| ToolError::Parse {
            tool: "ffprobe".to_string(),
            message: e.to_string(),
        })?;

    let stream = probe_data["streams"].get(0);

    let width = stream
        .and_then(|s| s["width"].as_u64())
        .and_then(|w| u32::try_from(w).ok())
        .filter(|w| *w > 0);
    let height = stream
        .and_then(|s| s["height"].as_u64())
        .and_then(|h| u32::try_from(h).ok())
        .filter(|h| *h > 0);

    let duration_secs = match kind {
        MediaKind::Screenshot => None,
        MediaKind::Video => probe_data["format"]["duration"]
            .as_str()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0),
    };

    Ok(ProbeMetadata {
        duration_secs,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video() {
        let json = br#"{"streams":[{"codec_name":"h264","width":1920,"height":1080}],
            "format":{"duration":"12.500000"}}"#;
        let meta = parse_probe_output(json, MediaKind::Video).unwrap();
        assert_eq!(meta.duration_secs, Some(12.5));
        assert_eq!(meta.width, Some(1920));
        assert_eq!(meta.height, Some(1080));
    }

    #[test]
    fn test_parse_screenshot_ignores_duration() {
        let json = br#"{"streams":[{"width":800,"height":600}],"format":{"duration":"0.040000"}}"#;
        let meta = parse_probe_output(json, MediaKind::Screenshot).unwrap();
        assert_eq!(meta.duration_secs, None);
        assert_eq!(meta.width, Some(800));
    }

    #[test]
    fn test_parse_missing_fields() {
        let meta = parse_probe_output(br#"{"streams":[],"format":{"duration":"N/A"}}"#, MediaKind::Video)
            .unwrap();
        assert_eq!(meta, ProbeMetadata::default());
    }

    #[test]
    fn test_parse_garbage() {
        let err = parse_probe_output(b"not json", MediaKind::Video).unwrap_err();
        assert!(matches!(err, ToolError::Parse { .. }));
    }
}
