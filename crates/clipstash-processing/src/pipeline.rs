use clipstash_core::models::{DerivedMedia, MediaRecord};
use clipstash_core::{AppError, PreviewConfig};
use clipstash_db::MediaRecordRepository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use uuid::Uuid;

use crate::error::ToolError;
use crate::preview::{render_preview, PreviewFormat};
use crate::probe::{probe, ProbeMetadata};
use crate::tools::MediaTools;

/// How preview derivation ended for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewOutcome {
    /// JPEG and WebP previews rendered.
    Complete,
    /// WebP failed; the JPEG is the only preview.
    JpegOnly,
    /// JPEG failed, so the record has no preview.
    NoPreview,
    /// ffmpeg or ffprobe is missing. Nothing was written.
    ToolsUnavailable,
    /// The record does not exist (any more). Nothing was written.
    RecordGone,
}

impl PreviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewOutcome::Complete => "complete",
            PreviewOutcome::JpegOnly => "jpeg_only",
            PreviewOutcome::NoPreview => "no_preview",
            PreviewOutcome::ToolsUnavailable => "tools_unavailable",
            PreviewOutcome::RecordGone => "record_gone",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub record_id: Uuid,
    pub outcome: PreviewOutcome,
    pub derived: DerivedMedia,
}

impl PipelineReport {
    /// A record with at least a JPEG preview counts as successfully processed.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PreviewOutcome::Complete | PreviewOutcome::JpegOnly)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub scanned: usize,
    pub repaired: usize,
    pub failed: usize,
}

/// Derives metadata and previews for stored media.
///
/// Expected failures are outcomes in the returned [`PipelineReport`]; only repository
/// errors are returned as `Err`.
pub struct ThumbnailPipeline {
    tools: Arc<MediaTools>,
    repository: Arc<dyn MediaRecordRepository>,
    config: PreviewConfig,
    preview_dir: PathBuf,
}

impl ThumbnailPipeline {
    pub fn new(
        tools: Arc<MediaTools>,
        repository: Arc<dyn MediaRecordRepository>,
        config: PreviewConfig,
        preview_dir: PathBuf,
    ) -> Self {
        Self {
            tools,
            repository,
            config,
            preview_dir,
        }
    }

    pub async fn process(&self, record_id: Uuid) -> Result<PipelineReport, AppError> {
        let start = Instant::now();

        let Some(record) = self.repository.get(record_id).await? else {
            tracing::info!(record_id = %record_id, "Record gone before preview derivation, skipping");
            return Ok(report(record_id, PreviewOutcome::RecordGone, DerivedMedia::default()));
        };

        if self.tools.ensure_available().await.is_err() {
            return Ok(report(record_id, PreviewOutcome::ToolsUnavailable, DerivedMedia::default()));
        }

        let (outcome, derived) = match self.derive(&record).await {
            Ok(result) => result,
            Err(e) if e.is_fatal() => {
                tracing::error!(record_id = %record_id, error = %e, "Media tool disappeared during preview derivation");
                return Ok(report(record_id, PreviewOutcome::ToolsUnavailable, DerivedMedia::default()));
            }
            Err(e) => {
                tracing::warn!(record_id = %record_id, error = %e, "Preview derivation failed");
                (PreviewOutcome::NoPreview, DerivedMedia::default())
            }
        };

        if !self.repository.apply_derived(record_id, &derived).await? {
            tracing::info!(record_id = %record_id, "Record deleted during preview derivation, discarding previews");
            remove_previews(&derived).await;
            return Ok(report(record_id, PreviewOutcome::RecordGone, DerivedMedia::default()));
        }

        tracing::info!(
            record_id = %record_id,
            kind = %record.kind,
            outcome = outcome.as_str(),
            duration_ms = start.elapsed().as_millis(),
            "Preview derivation finished"
        );

        Ok(report(record_id, outcome, derived))
    }

    /// Probe, then JPEG, then WebP. Per-file failures become outcomes; a fatal tool
    /// error is returned.
    async fn derive(&self, record: &MediaRecord) -> Result<(PreviewOutcome, DerivedMedia), ToolError> {
        fs::create_dir_all(&self.preview_dir)
            .await
            .map_err(|source| ToolError::Io {
                tool: self.tools.ffmpeg_path().to_string(),
                source,
            })?;

        let metadata = match probe(
            &self.tools,
            &record.storage_path,
            record.kind,
            self.config.probe_timeout,
        )
        .await
        {
            Ok(metadata) => metadata,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(record_id = %record.id, error = %e, "Probe failed, continuing without metadata");
                ProbeMetadata::default()
            }
        };

        let mut derived = DerivedMedia {
            duration_secs: metadata.duration_secs,
            width: metadata.width,
            height: metadata.height,
            preview_webp_path: None,
            preview_jpeg_path: None,
        };

        let stem = preview_stem(&record.filename);

        match self.render(record, &stem, metadata.duration_secs, PreviewFormat::Jpeg).await {
            Ok(path) => derived.preview_jpeg_path = Some(path),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(record_id = %record.id, error = %e, "JPEG preview failed, record keeps no preview");
                return Ok((PreviewOutcome::NoPreview, derived));
            }
        }

        match self.render(record, &stem, metadata.duration_secs, PreviewFormat::Webp).await {
            Ok(path) => {
                derived.preview_webp_path = Some(path);
                Ok((PreviewOutcome::Complete, derived))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(record_id = %record.id, error = %e, "WebP preview failed, keeping JPEG only");
                Ok((PreviewOutcome::JpegOnly, derived))
            }
        }
    }

    async fn render(
        &self,
        record: &MediaRecord,
        stem: &str,
        duration_secs: Option<f64>,
        format: PreviewFormat,
    ) -> Result<PathBuf, ToolError> {
        render_preview(
            &self.tools,
            &record.storage_path,
            &self.preview_dir,
            stem,
            record.kind,
            duration_secs,
            format,
            self.config.max_width,
            self.config.preview_timeout(record.kind),
        )
        .await
    }

    /// Re-run the pipeline for up to `limit` records that have no JPEG preview.
    ///
    /// Preview names are derived from the stored file name, so reruns overwrite rather
    /// than accumulate. Stops early when the tools are missing.
    pub async fn repair_missing(&self, limit: i64) -> Result<RepairSummary, AppError> {
        let records = self.repository.list_missing_previews(limit).await?;
        let mut summary = RepairSummary {
            scanned: records.len(),
            ..Default::default()
        };

        for record in records {
            let result = self.process(record.id).await?;
            match result.outcome {
                PreviewOutcome::ToolsUnavailable => {
                    tracing::error!("Media tools unavailable, aborting repair");
                    summary.failed += summary.scanned - summary.repaired - summary.failed;
                    break;
                }
                _ if result.is_success() => summary.repaired += 1,
                _ => summary.failed += 1,
            }
        }

        tracing::info!(
            scanned = summary.scanned,
            repaired = summary.repaired,
            failed = summary.failed,
            "Preview repair finished"
        );

        Ok(summary)
    }
}

fn report(record_id: Uuid, outcome: PreviewOutcome, derived: DerivedMedia) -> PipelineReport {
    PipelineReport {
        record_id,
        outcome,
        derived,
    }
}

fn preview_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| filename.to_string())
}

async fn remove_previews(derived: &DerivedMedia) {
    for path in [&derived.preview_jpeg_path, &derived.preview_webp_path]
        .into_iter()
        .flatten()
    {
        if let Err(e) = fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove orphaned preview");
        }
    }
}
