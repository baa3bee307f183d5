use clipstash_core::StorageConfig;
use clipstash_storage::reclaim_stale_temp_files;
use clipstash_upload::ChunkAssembler;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub idle_sessions: usize,
    pub orphaned_dirs: usize,
    pub temp_files: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.idle_sessions + self.orphaned_dirs + self.temp_files
    }
}

/// Periodically reclaims abandoned upload sessions, orphaned chunk directories and
/// leftover temp files.
pub struct SessionSweeper {
    assembler: Arc<ChunkAssembler>,
    storage: StorageConfig,
    idle_timeout: Duration,
}

impl SessionSweeper {
    pub fn new(assembler: Arc<ChunkAssembler>, storage: StorageConfig, idle_timeout: Duration) -> Self {
        Self {
            assembler,
            storage,
            idle_timeout,
        }
    }

    /// Run one sweep. Failures are logged and the remaining steps still run.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.assembler.reclaim_idle(self.idle_timeout).await {
            Ok(n) => report.idle_sessions = n,
            Err(e) => tracing::error!(error = %e, "Idle session reclamation failed"),
        }

        match self.assembler.reclaim_orphaned_dirs(self.idle_timeout).await {
            Ok(n) => report.orphaned_dirs = n,
            Err(e) => tracing::error!(error = %e, "Orphaned chunk directory reclamation failed"),
        }

        for dir in self.storage.all_dirs() {
            match reclaim_stale_temp_files(&dir, self.idle_timeout).await {
                Ok(n) => report.temp_files += n,
                Err(e) => tracing::error!(
                    directory = %dir.display(),
                    error = %e,
                    "Temp file reclamation failed"
                ),
            }
        }

        if report.total() > 0 {
            tracing::info!(
                idle_sessions = report.idle_sessions,
                orphaned_dirs = report.orphaned_dirs,
                temp_files = report.temp_files,
                "Storage sweep reclaimed leftovers"
            );
        } else {
            tracing::debug!("Storage sweep found nothing to reclaim");
        }

        report
    }

    /// Sweep every `every` until `cancel` fires. A zero interval disables sweeping.
    pub fn spawn(self: Arc<Self>, every: Duration, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if every.is_zero() {
            tracing::info!("Session sweeper disabled");
            return None;
        }

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        Some(tokio::spawn(async move {
            tracing::info!(interval_secs = every.as_secs(), "Session sweeper started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                }
            }
            tracing::info!("Session sweeper stopped");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use clipstash_core::models::ChunkUpload;
    use clipstash_core::{NoopPreviewScheduler, UploadConfig};
    use clipstash_db::InMemoryMediaRepository;
    use clipstash_storage::{AtomicFileWriter, FixedSpaceProbe, StorageHealthChecker};
    use clipstash_upload::MediaDescriptor;
    use uuid::Uuid;

    fn sweeper(root: &std::path::Path, idle: Duration) -> (Arc<ChunkAssembler>, SessionSweeper) {
        let storage = StorageConfig::under_root(root);
        let space = Arc::new(FixedSpaceProbe::new(u64::MAX / 2));
        let assembler = Arc::new(ChunkAssembler::new(
            storage.clone(),
            UploadConfig::default(),
            StorageHealthChecker::new(space.clone(), 0),
            AtomicFileWriter::new(space),
            MediaDescriptor::new(Arc::new(InMemoryMediaRepository::new())),
            Arc::new(NoopPreviewScheduler),
        ));
        let sweeper = SessionSweeper::new(assembler.clone(), storage, idle);
        (assembler, sweeper)
    }

    fn first_of_two(session_id: &str) -> ChunkUpload {
        ChunkUpload {
            session_id: session_id.to_string(),
            index: 0,
            total_chunks: Some(2),
            original_filename: "clip.mp4".to_string(),
            content_type: Some("video/mp4".to_string()),
            expected_digest: None,
            owner_id: Uuid::new_v4(),
            data: Bytes::from_static(b"half a clip"),
        }
    }

    #[tokio::test]
    async fn test_sweep_reclaims_everything_stale() {
        let root = tempfile::tempdir().unwrap();
        let (assembler, sweeper) = sweeper(root.path(), Duration::ZERO);

        assembler.receive_chunk(first_of_two("abandoned")).await.unwrap();

        let chunks = root.path().join(".chunks");
        std::fs::create_dir_all(chunks.join("from-before-restart")).unwrap();

        let videos = root.path().join("videos");
        std::fs::create_dir_all(&videos).unwrap();
        std::fs::write(videos.join(".clipstash-tmp-1234.clip.mp4"), b"partial").unwrap();
        std::fs::write(videos.join("kept.mp4"), b"committed").unwrap();

        let report = sweeper.sweep_once().await;
        assert_eq!(report.idle_sessions, 1);
        assert_eq!(report.orphaned_dirs, 1);
        assert_eq!(report.temp_files, 1);

        assert!(assembler.sessions().is_empty());
        assert!(!chunks.join("abandoned").exists());
        assert!(!chunks.join("from-before-restart").exists());
        assert!(videos.join("kept.mp4").exists());
        assert_eq!(sweeper.sweep_once().await.total(), 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_active_sessions() {
        let root = tempfile::tempdir().unwrap();
        let (assembler, sweeper) = sweeper(root.path(), Duration::from_secs(3600));

        assembler.receive_chunk(first_of_two("active")).await.unwrap();

        assert_eq!(sweeper.sweep_once().await, SweepReport::default());
        assert!(root.path().join(".chunks/active/000000.part").exists());
        assert_eq!(assembler.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_disables_sweeper() {
        let root = tempfile::tempdir().unwrap();
        let (_, sweeper) = sweeper(root.path(), Duration::ZERO);
        assert!(Arc::new(sweeper)
            .spawn(Duration::ZERO, CancellationToken::new())
            .is_none());
    }

    #[tokio::test]
    async fn test_spawned_sweeper_stops_on_cancel() {
        let root = tempfile::tempdir().unwrap();
        let (_, sweeper) = sweeper(root.path(), Duration::ZERO);
        let cancel = CancellationToken::new();

        let handle = Arc::new(sweeper)
            .spawn(Duration::from_millis(10), cancel.clone())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
