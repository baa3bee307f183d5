//! Configuration module
//!
//! Configuration is read once from the environment and split into sections that are
//! handed to each component's constructor. Nothing here is process-global, so tests
//! build the sections directly and point them at temporary directories.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{BYTES_PER_MB, SCREENSHOT_SUBDIR, VIDEO_SUBDIR};
use crate::models::MediaKind;

const STORAGE_SAFETY_MARGIN_MB: u64 = 1024;
const MAX_CHUNK_SIZE_MB: u64 = 64;
const MAX_CHUNKS_PER_UPLOAD: u32 = 10_000;
const SESSION_IDLE_TIMEOUT_SECS: u64 = 24 * 60 * 60;
const SESSION_SWEEP_INTERVAL_SECS: u64 = 15 * 60;
const PROBE_TIMEOUT_SECS: u64 = 10;
const VIDEO_PREVIEW_TIMEOUT_SECS: u64 = 30;
const SCREENSHOT_PREVIEW_TIMEOUT_SECS: u64 = 15;
const PREVIEW_MAX_WIDTH: u32 = 480;
const PREVIEW_WORKERS: usize = 2;
const PREVIEW_QUEUE_CAPACITY: usize = 256;
const DB_MAX_CONNECTIONS: u32 = 10;

/// Where bytes live on disk.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Root of final asset storage; media kinds get their own subdirectory.
    pub storage_root: PathBuf,
    /// Per-session chunk working directories live under here.
    pub chunks_dir: PathBuf,
    /// Derived preview images.
    pub preview_dir: PathBuf,
    /// Free space that must remain after any write.
    pub safety_margin_bytes: u64,
}

impl StorageConfig {
    /// Layout with the default subdirectories under `storage_root`.
    pub fn under_root(storage_root: impl Into<PathBuf>) -> Self {
        let storage_root = storage_root.into();
        Self {
            chunks_dir: storage_root.join(".chunks"),
            preview_dir: storage_root.join("previews"),
            storage_root,
            safety_margin_bytes: STORAGE_SAFETY_MARGIN_MB * BYTES_PER_MB,
        }
    }

    /// Final storage directory for a media kind.
    pub fn media_dir(&self, kind: MediaKind) -> PathBuf {
        match kind {
            MediaKind::Video => self.storage_root.join(VIDEO_SUBDIR),
            MediaKind::Screenshot => self.storage_root.join(SCREENSHOT_SUBDIR),
        }
    }

    /// Every directory the pipeline writes into.
    pub fn all_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.media_dir(MediaKind::Video),
            self.media_dir(MediaKind::Screenshot),
            self.chunks_dir.clone(),
            self.preview_dir.clone(),
        ]
    }
}

/// Chunked upload limits and session reclamation policy.
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub max_chunk_size_bytes: u64,
    pub max_chunks_per_upload: u32,
    /// Open sessions without activity for this long are reclaimable.
    pub session_idle_timeout: Duration,
    /// Interval between sweeps. Zero disables the background sweeper.
    pub session_sweep_interval: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_chunk_size_bytes: MAX_CHUNK_SIZE_MB * BYTES_PER_MB,
            max_chunks_per_upload: MAX_CHUNKS_PER_UPLOAD,
            session_idle_timeout: Duration::from_secs(SESSION_IDLE_TIMEOUT_SECS),
            session_sweep_interval: Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS),
        }
    }
}

/// External tools and background preview derivation.
#[derive(Clone, Debug)]
pub struct PreviewConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub probe_timeout: Duration,
    pub video_preview_timeout: Duration,
    pub screenshot_preview_timeout: Duration,
    pub max_width: u32,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl PreviewConfig {
    /// Timeout for one preview render of the given source kind.
    pub fn preview_timeout(&self, kind: MediaKind) -> Duration {
        match kind {
            MediaKind::Video => self.video_preview_timeout,
            MediaKind::Screenshot => self.screenshot_preview_timeout,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            probe_timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
            video_preview_timeout: Duration::from_secs(VIDEO_PREVIEW_TIMEOUT_SECS),
            screenshot_preview_timeout: Duration::from_secs(SCREENSHOT_PREVIEW_TIMEOUT_SECS),
            max_width: PREVIEW_MAX_WIDTH,
            workers: PREVIEW_WORKERS,
            queue_capacity: PREVIEW_QUEUE_CAPACITY,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct ClipstashConfig {
    pub environment: String,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub preview: PreviewConfig,
}

impl ClipstashConfig {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let storage_root = env::var("STORAGE_ROOT")
            .map(PathBuf::from)
            .map_err(|_| anyhow::anyhow!("STORAGE_ROOT must be set"))?;

        let mut storage = StorageConfig::under_root(storage_root);
        if let Ok(dir) = env::var("CHUNKS_DIR") {
            storage.chunks_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("PREVIEW_DIR") {
            storage.preview_dir = PathBuf::from(dir);
        }
        storage.safety_margin_bytes = env::var("STORAGE_SAFETY_MARGIN_MB")
            .unwrap_or_else(|_| STORAGE_SAFETY_MARGIN_MB.to_string())
            .parse::<u64>()
            .unwrap_or(STORAGE_SAFETY_MARGIN_MB)
            * BYTES_PER_MB;

        let upload = UploadConfig {
            max_chunk_size_bytes: env::var("MAX_CHUNK_SIZE_MB")
                .unwrap_or_else(|_| MAX_CHUNK_SIZE_MB.to_string())
                .parse::<u64>()
                .unwrap_or(MAX_CHUNK_SIZE_MB)
                * BYTES_PER_MB,
            max_chunks_per_upload: env::var("MAX_CHUNKS_PER_UPLOAD")
                .unwrap_or_else(|_| MAX_CHUNKS_PER_UPLOAD.to_string())
                .parse()
                .unwrap_or(MAX_CHUNKS_PER_UPLOAD),
            session_idle_timeout: Duration::from_secs(
                env::var("SESSION_IDLE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| SESSION_IDLE_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(SESSION_IDLE_TIMEOUT_SECS),
            ),
            session_sweep_interval: Duration::from_secs(
                env::var("SESSION_SWEEP_INTERVAL_SECS")
                    .unwrap_or_else(|_| SESSION_SWEEP_INTERVAL_SECS.to_string())
                    .parse()
                    .unwrap_or(SESSION_SWEEP_INTERVAL_SECS),
            ),
        };

        let preview = PreviewConfig {
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            probe_timeout: Duration::from_secs(
                env::var("PROBE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| PROBE_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(PROBE_TIMEOUT_SECS),
            ),
            video_preview_timeout: Duration::from_secs(
                env::var("VIDEO_PREVIEW_TIMEOUT_SECS")
                    .unwrap_or_else(|_| VIDEO_PREVIEW_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(VIDEO_PREVIEW_TIMEOUT_SECS),
            ),
            screenshot_preview_timeout: Duration::from_secs(
                env::var("SCREENSHOT_PREVIEW_TIMEOUT_SECS")
                    .unwrap_or_else(|_| SCREENSHOT_PREVIEW_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(SCREENSHOT_PREVIEW_TIMEOUT_SECS),
            ),
            max_width: env::var("PREVIEW_MAX_WIDTH")
                .unwrap_or_else(|_| PREVIEW_MAX_WIDTH.to_string())
                .parse()
                .unwrap_or(PREVIEW_MAX_WIDTH),
            workers: env::var("PREVIEW_WORKERS")
                .unwrap_or_else(|_| PREVIEW_WORKERS.to_string())
                .parse()
                .unwrap_or(PREVIEW_WORKERS),
            queue_capacity: env::var("PREVIEW_QUEUE_CAPACITY")
                .unwrap_or_else(|_| PREVIEW_QUEUE_CAPACITY.to_string())
                .parse()
                .unwrap_or(PREVIEW_QUEUE_CAPACITY),
        };

        let config = ClipstashConfig {
            environment,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| DB_MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(DB_MAX_CONNECTIONS),
            storage,
            upload,
            preview,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        require_absolute("STORAGE_ROOT", &self.storage.storage_root)?;
        require_absolute("CHUNKS_DIR", &self.storage.chunks_dir)?;
        require_absolute("PREVIEW_DIR", &self.storage.preview_dir)?;

        if self.upload.max_chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_CHUNK_SIZE_MB must be greater than 0"));
        }
        if self.upload.max_chunks_per_upload == 0 {
            return Err(anyhow::anyhow!("MAX_CHUNKS_PER_UPLOAD must be greater than 0"));
        }
        if self.preview.workers == 0 {
            return Err(anyhow::anyhow!("PREVIEW_WORKERS must be greater than 0"));
        }
        if self.preview.queue_capacity == 0 {
            return Err(anyhow::anyhow!("PREVIEW_QUEUE_CAPACITY must be greater than 0"));
        }
        if self.preview.probe_timeout.is_zero()
            || self.preview.video_preview_timeout.is_zero()
            || self.preview.screenshot_preview_timeout.is_zero()
        {
            return Err(anyhow::anyhow!("Tool timeouts must be greater than 0"));
        }
        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        Ok(())
    }
}

fn require_absolute(name: &str, path: &Path) -> Result<(), anyhow::Error> {
    if !path.is_absolute() {
        return Err(anyhow::anyhow!(
            "{} must be an absolute path, got {}",
            name,
            path.display()
        ));
    }
    Ok(())
}
