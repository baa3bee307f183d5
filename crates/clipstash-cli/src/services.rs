use anyhow::Context;
use clipstash_core::ClipstashConfig;
use clipstash_db::{InMemoryMediaRepository, MediaRecordRepository, PgMediaRepository};
use clipstash_processing::{MediaTools, ThumbnailPipeline};
use clipstash_storage::{
    AtomicFileWriter, SpaceProbe, StorageHealthChecker, StorageHealthReport, SysinfoSpaceProbe,
};
use clipstash_upload::{ChunkAssembler, MediaDescriptor};
use clipstash_worker::{PreviewQueue, SessionSweeper};
use std::sync::Arc;
use std::time::Duration;

/// Everything the upload and preview paths need, wired from one configuration.
pub struct Services {
    pub config: ClipstashConfig,
    pub repository: Arc<dyn MediaRecordRepository>,
    pub has_database: bool,
    pub space: Arc<dyn SpaceProbe>,
    pub tools: Arc<MediaTools>,
    pub pipeline: Arc<ThumbnailPipeline>,
    pub queue: Arc<PreviewQueue>,
    pub assembler: Arc<ChunkAssembler>,
}

impl Services {
    /// Connect to PostgreSQL when `DATABASE_URL` is set, otherwise keep records in memory.
    pub async fn connect(config: ClipstashConfig) -> anyhow::Result<Self> {
        let (repository, has_database): (Arc<dyn MediaRecordRepository>, bool) =
            match &config.database_url {
                Some(url) => {
                    let pool = clipstash_db::connect(url, config.db_max_connections)
                        .await
                        .context("Failed to set up the media record database")?;
                    (Arc::new(PgMediaRepository::new(pool)), true)
                }
                None => {
                    tracing::warn!("DATABASE_URL not set, media records are kept in memory for this run only");
                    (Arc::new(InMemoryMediaRepository::new()), false)
                }
            };

        let mut services = Self::assemble(config, repository, Arc::new(SysinfoSpaceProbe));
        services.has_database = has_database;
        Ok(services)
    }

    /// Wire the components around an existing repository and free-space probe.
    /// Must be called inside a Tokio runtime; the preview workers start immediately.
    pub fn assemble(
        config: ClipstashConfig,
        repository: Arc<dyn MediaRecordRepository>,
        space: Arc<dyn SpaceProbe>,
    ) -> Self {
        let tools = Arc::new(MediaTools::from_config(&config.preview));
        let pipeline = Arc::new(ThumbnailPipeline::new(
            tools.clone(),
            repository.clone(),
            config.preview.clone(),
            config.storage.preview_dir.clone(),
        ));
        let queue = Arc::new(PreviewQueue::from_config(pipeline.clone(), &config.preview));
        let assembler = Arc::new(ChunkAssembler::new(
            config.storage.clone(),
            config.upload.clone(),
            StorageHealthChecker::new(space.clone(), config.storage.safety_margin_bytes),
            AtomicFileWriter::new(space.clone()),
            MediaDescriptor::new(repository.clone()),
            queue.clone(),
        ));

        Self {
            config,
            repository,
            has_database: false,
            space,
            tools,
            pipeline,
            queue,
            assembler,
        }
    }

    pub fn health_checker(&self) -> StorageHealthChecker {
        StorageHealthChecker::new(self.space.clone(), self.config.storage.safety_margin_bytes)
    }

    /// Health of every directory the pipeline writes into, each checked for
    /// `required_bytes` on top of the safety margin.
    pub async fn check_storage(&self, required_bytes: u64) -> Vec<StorageHealthReport> {
        let checker = self.health_checker();
        let mut reports = Vec::new();
        for dir in self.config.storage.all_dirs() {
            reports.push(checker.check(&dir, required_bytes).await);
        }
        reports
    }

    pub fn sweeper(&self, older_than: Duration) -> SessionSweeper {
        SessionSweeper::new(
            self.assembler.clone(),
            self.config.storage.clone(),
            older_than,
        )
    }
}
