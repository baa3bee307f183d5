//! Preview rendering via ffmpeg.
//!
//! ffmpeg writes to a reserved-prefix temporary name in the preview directory, which is
//! renamed onto `<stem>.jpg` / `<stem>.webp` only after a successful run. A failed or
//! timed-out render leaves nothing behind.

use clipstash_core::constants::TEMP_FILE_PREFIX;
use clipstash_core::models::MediaKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use uuid::Uuid;

use crate::error::ToolError;
use crate::tools::MediaTools;

/// Videos at least this long are sampled at [`VIDEO_SEEK_SECS`] instead of the first frame.
const MIN_DURATION_FOR_SEEK: f64 = 2.0;
const VIDEO_SEEK_SECS: f64 = 1.0;
const JPEG_QUALITY: &str = "3";
const WEBP_QUALITY: &str = "80";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewFormat {
    Jpeg,
    Webp,
}

impl PreviewFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PreviewFormat::Jpeg => "jpg",
            PreviewFormat::Webp => "webp",
        }
    }
}

/// Final path of a preview for a stored file name stem.
pub fn preview_path(preview_dir: &Path, stem: &str, format: PreviewFormat) -> PathBuf {
    preview_dir.join(format!("{}.{}", stem, format.extension()))
}

/// ffmpeg arguments for one still preview, scaled down to at most `max_width`.
pub fn preview_args(
    source: &Path,
    output: &Path,
    kind: MediaKind,
    duration_secs: Option<f64>,
    format: PreviewFormat,
    max_width: u32,
) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-v".to_string(), "error".to_string()];

    if kind == MediaKind::Video && duration_secs.is_some_and(|d| d >= MIN_DURATION_FOR_SEEK) {
        args.extend_from_slice(&["-ss".to_string(), format!("{:.3}", VIDEO_SEEK_SECS)]);
    }

    args.extend_from_slice(&[
        "-i".to_string(),
        source.to_string_lossy().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        format!("scale='min({},iw)':-2", max_width),
    ]);

    match format {
        PreviewFormat::Jpeg => args.extend_from_slice(&[
            "-f".to_string(),
            "image2".to_string(),
            "-c:v".to_string(),
            "mjpeg".to_string(),
            "-q:v".to_string(),
            JPEG_QUALITY.to_string(),
        ]),
        PreviewFormat::Webp => args.extend_from_slice(&[
            "-f".to_string(),
            "webp".to_string(),
            "-c:v".to_string(),
            "libwebp".to_string(),
            "-quality".to_string(),
            WEBP_QUALITY.to_string(),
        ]),
    }

    args.push(output.to_string_lossy().to_string());
    args
}

/// Render one preview of `source` into `preview_dir/<stem>.<ext>`.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip(tools, source, preview_dir), fields(
    process.executable.name = "ffmpeg",
    ffmpeg.operation = "preview"
))]
pub async fn render_preview(
    tools: &MediaTools,
    source: &Path,
    preview_dir: &Path,
    stem: &str,
    kind: MediaKind,
    duration_secs: Option<f64>,
    format: PreviewFormat,
    max_width: u32,
    timeout: Duration,
) -> Result<PathBuf, ToolError> {
    let final_path = preview_path(preview_dir, stem, format);
    let temp_path = preview_dir.join(format!(
        "{}{}.{}.{}",
        TEMP_FILE_PREFIX,
        Uuid::new_v4().simple(),
        stem,
        format.extension()
    ));

    let args = preview_args(source, &temp_path, kind, duration_secs, format, max_width);
    let result = finish_render(tools, &args, &temp_path, &final_path, timeout).await;

    if result.is_err() {
        if let Err(e) = fs::remove_file(&temp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %temp_path.display(), error = %e, "Failed to remove partial preview");
            }
        }
    }

    result
}

async fn finish_render(
    tools: &MediaTools,
    args: &[String],
    temp_path: &Path,
    final_path: &Path,
    timeout: Duration,
) -> Result<PathBuf, ToolError> {
    tools.run_ffmpeg(args, timeout).await?;

    let io_err = |source: std::io::Error| ToolError::Io {
        tool: tools.ffmpeg_path().to_string(),
        source,
    };

    let produced = fs::metadata(temp_path).await.map(|m| m.len()).unwrap_or(0);
    if produced == 0 {
        return Err(ToolError::Failed {
            tool: tools.ffmpeg_path().to_string(),
            status: "exit status: 0".to_string(),
            stderr: "no output produced".to_string(),
        });
    }

    fs::rename(temp_path, final_path).await.map_err(io_err)?;
    Ok(final_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_args_seek_when_long_enough() {
        let args = preview_args(
            Path::new("/srv/clips/videos/a_clip.mp4"),
            Path::new("/srv/clips/previews/out.jpg"),
            MediaKind::Video,
            Some(12.5),
            PreviewFormat::Jpeg,
            480,
        );
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert!(args.contains(&"mjpeg".to_string()));
        assert!(args.contains(&"scale='min(480,iw)':-2".to_string()));
        assert_eq!(args.last().unwrap(), "/srv/clips/previews/out.jpg");
    }

    #[test]
    fn test_short_video_and_screenshot_take_first_frame() {
        let short = preview_args(
            Path::new("/a.mp4"),
            Path::new("/o.webp"),
            MediaKind::Video,
            Some(0.5),
            PreviewFormat::Webp,
            480,
        );
        assert!(!short.contains(&"-ss".to_string()));
        assert!(short.contains(&"libwebp".to_string()));

        let shot = preview_args(
            Path::new("/a.png"),
            Path::new("/o.jpg"),
            MediaKind::Screenshot,
            None,
            PreviewFormat::Jpeg,
            320,
        );
        assert!(!shot.contains(&"-ss".to_string()));
    }

    #[test]
    fn test_preview_path() {
        assert_eq!(
            preview_path(Path::new("/p"), "abc_clip", PreviewFormat::Webp),
            PathBuf::from("/p/abc_clip.webp")
        );
    }
}
