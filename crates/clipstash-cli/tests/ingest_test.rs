//! Local ingestion through the fully wired services, records kept in memory.

use clipstash_cli::{file_digest, ingest_file, IngestOptions, Services};
use clipstash_core::models::MediaKind;
use clipstash_core::{
    AppError, ClipstashConfig, PreviewConfig, StorageConfig, StorageErrorKind, UploadConfig,
};
use clipstash_db::{InMemoryMediaRepository, MediaRecordRepository};
use clipstash_storage::FixedSpaceProbe;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

fn services(root: &Path, available: u64) -> (Services, InMemoryMediaRepository) {
    let storage = StorageConfig::under_root(root.join("store"));
    let config = ClipstashConfig {
        environment: "test".to_string(),
        database_url: None,
        db_max_connections: 1,
        storage: StorageConfig {
            safety_margin_bytes: 4096,
            ..storage
        },
        upload: UploadConfig::default(),
        preview: PreviewConfig {
            ffmpeg_path: root.join("no-ffmpeg").to_string_lossy().into_owned(),
            ffprobe_path: root.join("no-ffprobe").to_string_lossy().into_owned(),
            ..PreviewConfig::default()
        },
    };
    let repo = InMemoryMediaRepository::new();
    let services = Services::assemble(
        config,
        Arc::new(repo.clone()),
        Arc::new(FixedSpaceProbe::new(available)),
    );
    (services, repo)
}

fn png_fixture(dir: &TempDir, len: usize) -> std::path::PathBuf {
    let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend((0..len - data.len()).map(|i| (i % 251) as u8));
    let path = dir.path().join("capture.png");
    std::fs::write(&path, data).unwrap();
    path
}

fn options(chunk_size: u64) -> IngestOptions {
    IngestOptions {
        chunk_size,
        shuffle: true,
        owner_id: Uuid::new_v4(),
        content_type: None,
    }
}

#[tokio::test]
async fn test_ingest_shuffled_chunks_commits_identical_file() {
    let dir = tempfile::tempdir().unwrap();
    let (services, repo) = services(dir.path(), u64::MAX / 2);
    let source = png_fixture(&dir, 5000);

    let summary = ingest_file(&services.assembler, &source, &options(1024))
        .await
        .unwrap();
    services.queue.drain().await;

    assert_eq!(summary.chunks, 5);
    assert_eq!(summary.size_bytes, 5000);
    assert_eq!(summary.digest, file_digest(&source).await.unwrap());

    let record = repo.get(summary.record_id).await.unwrap().unwrap();
    assert_eq!(record.kind, MediaKind::Screenshot);
    assert_eq!(record.original_filename, "capture.png");
    assert_eq!(record.content_digest, summary.digest);
    assert!(record.storage_path.starts_with(dir.path().join("store/screenshots")));
    assert_eq!(
        std::fs::read(&record.storage_path).unwrap(),
        std::fs::read(&source).unwrap()
    );
    // Tools are missing, so the preview job leaves the record untouched.
    assert!(!record.has_preview());
    assert!(!dir.path().join("store/.chunks").join(&summary.session_id).exists());
}

#[tokio::test]
async fn test_ingest_rejected_when_space_is_short() {
    let dir = tempfile::tempdir().unwrap();
    let (services, repo) = services(dir.path(), 4096 + 100);
    let source = png_fixture(&dir, 3000);

    let err = ingest_file(&services.assembler, &source, &options(1000))
        .await
        .unwrap_err();
    let app_error = err.downcast_ref::<AppError>().unwrap();
    assert_eq!(app_error.storage_kind(), Some(StorageErrorKind::InsufficientSpace));
    assert!(repo.is_empty());
    services.queue.shutdown().await;
}

#[tokio::test]
async fn test_ingest_unsupported_extension() {
    let dir = tempfile::tempdir().unwrap();
    let (services, _) = services(dir.path(), u64::MAX / 2);
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, b"plain text").unwrap();

    let err = ingest_file(&services.assembler, &path, &options(1024))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppError>(),
        Some(AppError::Validation(_))
    ));
    services.queue.shutdown().await;
}

#[tokio::test]
async fn test_check_storage_reports_missing_then_healthy() {
    let dir = tempfile::tempdir().unwrap();
    let (services, _) = services(dir.path(), u64::MAX / 2);

    let reports = services.check_storage(0).await;
    assert_eq!(reports.len(), 4);
    assert!(reports
        .iter()
        .all(|r| r.kind() == Some(StorageErrorKind::NotMounted)));

    for d in services.config.storage.all_dirs() {
        std::fs::create_dir_all(d).unwrap();
    }
    assert!(services.check_storage(0).await.iter().all(|r| r.is_ok()));
    services.queue.shutdown().await;
}
