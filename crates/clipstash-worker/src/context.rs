//! Preview handler trait
//!
//! The worker pool calls `handle` for every record id it dequeues. The production
//! implementation is [`ThumbnailPipeline`]; tests substitute their own.

use async_trait::async_trait;
use clipstash_processing::ThumbnailPipeline;
use uuid::Uuid;

/// Runs preview derivation for one record. Failures are logged, never returned:
/// a record left without previews is picked up again by repair.
#[async_trait]
pub trait PreviewHandler: Send + Sync {
    async fn handle(&self, record_id: Uuid);
}

#[async_trait]
impl PreviewHandler for ThumbnailPipeline {
    async fn handle(&self, record_id: Uuid) {
        match self.process(record_id).await {
            Ok(report) if report.is_success() => {
                tracing::debug!(record_id = %record_id, outcome = report.outcome.as_str(), "Preview job done");
            }
            Ok(report) => {
                tracing::warn!(
                    record_id = %record_id,
                    outcome = report.outcome.as_str(),
                    "Preview job finished without a complete preview"
                );
            }
            Err(e) => {
                tracing::error!(record_id = %record_id, error = %e, "Preview job failed");
            }
        }
    }
}
