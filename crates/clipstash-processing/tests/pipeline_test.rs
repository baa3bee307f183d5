//! Thumbnail pipeline against shell-script stand-ins for ffmpeg and ffprobe.
#![cfg(unix)]

use async_trait::async_trait;
use clipstash_core::models::{DerivedMedia, MediaKind, MediaRecord, NewMediaRecord};
use clipstash_core::{AppError, PreviewConfig};
use clipstash_db::{InMemoryMediaRepository, MediaRecordRepository};
use clipstash_processing::{MediaTools, PreviewOutcome, ThumbnailPipeline};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

const FAKE_FFPROBE: &str = r#"#!/bin/sh
echo '{"streams":[{"width":1920,"height":1080}],"format":{"duration":"12.5"}}'
"#;

const FFMPEG_OK: &str = r#"#!/bin/sh
for last; do :; done
[ "$1" = "-version" ] && { echo "ffmpeg version test"; exit 0; }
printf 'preview' > "$last"
"#;

const FFMPEG_NO_WEBP: &str = r#"#!/bin/sh
for last; do :; done
[ "$1" = "-version" ] && { echo "ffmpeg version test"; exit 0; }
case "$last" in
  *.webp) printf 'half' > "$last"; echo "Unknown encoder 'libwebp'" >&2; exit 1 ;;
esac
printf 'preview' > "$last"
"#;

const FFMPEG_BROKEN: &str = r#"#!/bin/sh
for last; do :; done
[ "$1" = "-version" ] && { echo "ffmpeg version test"; exit 0; }
printf 'partial' > "$last"
echo "Invalid data found when processing input" >&2
exit 1
"#;

const FFMPEG_HANGS: &str = r#"#!/bin/sh
[ "$1" = "-version" ] && { echo "ffmpeg version test"; exit 0; }
sleep 10
"#;

struct Harness {
    root: TempDir,
    repo: InMemoryMediaRepository,
    pipeline: ThumbnailPipeline,
}

impl Harness {
    fn preview_dir(&self) -> PathBuf {
        self.root.path().join("previews")
    }

    fn preview_files(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.preview_dir()) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    async fn stored_record(&self, name: &str) -> MediaRecord {
        let videos = self.root.path().join("videos");
        std::fs::create_dir_all(&videos).unwrap();
        let path = videos.join(name);
        std::fs::write(&path, b"not really a video").unwrap();

        self.repo
            .insert(NewMediaRecord {
                owner_id: Uuid::new_v4(),
                original_filename: "clip.mp4".to_string(),
                filename: name.to_string(),
                storage_path: path,
                size_bytes: 18,
                kind: MediaKind::Video,
                content_digest: "00".repeat(32),
            })
            .await
            .unwrap()
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

fn harness_with(ffmpeg_body: &str, repo: Option<Arc<dyn MediaRecordRepository>>) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let bin = root.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let ffmpeg = write_script(&bin, "ffmpeg", ffmpeg_body);
    let ffprobe = write_script(&bin, "ffprobe", FAKE_FFPROBE);

    let config = PreviewConfig {
        ffmpeg_path: ffmpeg.clone(),
        ffprobe_path: ffprobe.clone(),
        probe_timeout: Duration::from_secs(5),
        video_preview_timeout: Duration::from_millis(500),
        screenshot_preview_timeout: Duration::from_millis(500),
        ..PreviewConfig::default()
    };

    let memory = InMemoryMediaRepository::new();
    let repository = repo.unwrap_or_else(|| Arc::new(memory.clone()));
    let pipeline = ThumbnailPipeline::new(
        Arc::new(MediaTools::from_config(&config)),
        repository,
        config,
        root.path().join("previews"),
    );

    Harness {
        root,
        repo: memory,
        pipeline,
    }
}

fn harness(ffmpeg_body: &str) -> Harness {
    harness_with(ffmpeg_body, None)
}

#[tokio::test]
async fn test_complete_previews_and_metadata() {
    let h = harness(FFMPEG_OK);
    let record = h.stored_record("abc_clip.mp4").await;

    let report = h.pipeline.process(record.id).await.unwrap();
    assert_eq!(report.outcome, PreviewOutcome::Complete);
    assert!(report.is_success());

    let updated = h.repo.get(record.id).await.unwrap().unwrap();
    assert_eq!(updated.duration_secs, Some(12.5));
    assert_eq!((updated.width, updated.height), (Some(1920), Some(1080)));
    assert_eq!(updated.preview_jpeg_path, Some(h.preview_dir().join("abc_clip.jpg")));
    assert_eq!(updated.preview_webp_path, Some(h.preview_dir().join("abc_clip.webp")));
    assert_eq!(h.preview_files(), vec!["abc_clip.jpg", "abc_clip.webp"]);
}

#[tokio::test]
async fn test_webp_failure_keeps_jpeg() {
    let h = harness(FFMPEG_NO_WEBP);
    let record = h.stored_record("abc_clip.mp4").await;

    let report = h.pipeline.process(record.id).await.unwrap();
    assert_eq!(report.outcome, PreviewOutcome::JpegOnly);
    assert!(report.is_success());

    let updated = h.repo.get(record.id).await.unwrap().unwrap();
    assert!(updated.preview_jpeg_path.is_some());
    assert!(updated.preview_webp_path.is_none());
    assert_eq!(h.preview_files(), vec!["abc_clip.jpg"]);
}

#[tokio::test]
async fn test_jpeg_failure_leaves_no_preview() {
    let h = harness(FFMPEG_BROKEN);
    let record = h.stored_record("abc_clip.mp4").await;

    let report = h.pipeline.process(record.id).await.unwrap();
    assert_eq!(report.outcome, PreviewOutcome::NoPreview);
    assert!(!report.is_success());

    let updated = h.repo.get(record.id).await.unwrap().unwrap();
    assert!(updated.preview_jpeg_path.is_none());
    assert!(updated.preview_webp_path.is_none());
    assert_eq!(updated.duration_secs, Some(12.5));
    assert!(h.preview_files().is_empty());
}

#[tokio::test]
async fn test_render_timeout_is_per_file_failure() {
    let h = harness(FFMPEG_HANGS);
    let record = h.stored_record("abc_clip.mp4").await;

    let report = h.pipeline.process(record.id).await.unwrap();
    assert_eq!(report.outcome, PreviewOutcome::NoPreview);
    assert!(h.preview_files().is_empty());
}

#[tokio::test]
async fn test_missing_tools_write_nothing() {
    let root = tempfile::tempdir().unwrap();
    let repo = InMemoryMediaRepository::new();
    let config = PreviewConfig {
        ffmpeg_path: root.path().join("missing-ffmpeg").to_string_lossy().into_owned(),
        ..PreviewConfig::default()
    };
    let pipeline = ThumbnailPipeline::new(
        Arc::new(MediaTools::from_config(&config)),
        Arc::new(repo.clone()),
        config,
        root.path().join("previews"),
    );

    let record = repo
        .insert(NewMediaRecord {
            owner_id: Uuid::new_v4(),
            original_filename: "clip.mp4".to_string(),
            filename: "abc_clip.mp4".to_string(),
            storage_path: root.path().join("abc_clip.mp4"),
            size_bytes: 1,
            kind: MediaKind::Video,
            content_digest: "00".repeat(32),
        })
        .await
        .unwrap();

    let report = pipeline.process(record.id).await.unwrap();
    assert_eq!(report.outcome, PreviewOutcome::ToolsUnavailable);

    let summary = pipeline.repair_missing(10).await.unwrap();
    assert_eq!((summary.scanned, summary.repaired, summary.failed), (1, 0, 1));
}

#[tokio::test]
async fn test_unknown_record_is_noop() {
    let h = harness(FFMPEG_OK);
    let report = h.pipeline.process(Uuid::new_v4()).await.unwrap();
    assert_eq!(report.outcome, PreviewOutcome::RecordGone);
    assert!(h.preview_files().is_empty());
}

/// Returns a record on read but reports it gone on update, as a concurrent delete would.
struct VanishingRepository {
    inner: InMemoryMediaRepository,
}

#[async_trait]
impl MediaRecordRepository for VanishingRepository {
    async fn insert(&self, record: NewMediaRecord) -> Result<MediaRecord, AppError> {
        self.inner.insert(record).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, AppError> {
        self.inner.get(id).await
    }

    async fn apply_derived(&self, id: Uuid, _derived: &DerivedMedia) -> Result<bool, AppError> {
        self.inner.remove(id);
        Ok(false)
    }

    async fn list_missing_previews(&self, limit: i64) -> Result<Vec<MediaRecord>, AppError> {
        self.inner.list_missing_previews(limit).await
    }
}

#[tokio::test]
async fn test_record_deleted_mid_flight_discards_previews() {
    let inner = InMemoryMediaRepository::new();
    let h = harness_with(
        FFMPEG_OK,
        Some(Arc::new(VanishingRepository {
            inner: inner.clone(),
        })),
    );

    let videos = h.root.path().join("videos");
    std::fs::create_dir_all(&videos).unwrap();
    let record = inner
        .insert(NewMediaRecord {
            owner_id: Uuid::new_v4(),
            original_filename: "clip.mp4".to_string(),
            filename: "gone_clip.mp4".to_string(),
            storage_path: videos.join("gone_clip.mp4"),
            size_bytes: 1,
            kind: MediaKind::Video,
            content_digest: "00".repeat(32),
        })
        .await
        .unwrap();

    let report = h.pipeline.process(record.id).await.unwrap();
    assert_eq!(report.outcome, PreviewOutcome::RecordGone);
    assert!(h.preview_files().is_empty());
}

#[tokio::test]
async fn test_repair_is_idempotent() {
    let h = harness(FFMPEG_OK);
    let a = h.stored_record("a_one.mp4").await;
    let b = h.stored_record("b_two.mp4").await;

    let summary = h.pipeline.repair_missing(10).await.unwrap();
    assert_eq!((summary.scanned, summary.repaired, summary.failed), (2, 2, 0));
    assert!(h.repo.get(a.id).await.unwrap().unwrap().preview_jpeg_path.is_some());
    assert!(h.repo.get(b.id).await.unwrap().unwrap().preview_jpeg_path.is_some());

    let again = h.pipeline.repair_missing(10).await.unwrap();
    assert_eq!(again.scanned, 0);

    let rerun = h.pipeline.process(a.id).await.unwrap();
    assert_eq!(rerun.outcome, PreviewOutcome::Complete);
    assert_eq!(h.preview_files().len(), 4);
}
