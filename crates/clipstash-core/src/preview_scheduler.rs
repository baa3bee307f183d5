//! Hand-off seam between the synchronous upload path and background preview derivation.
//!
//! The upload crate only needs to announce that a record exists; the worker crate
//! implements this trait with a bounded queue. Scheduling never fails the upload: an
//! implementation that cannot accept the job logs it and the record stays without
//! previews until a repair run picks it up.

use uuid::Uuid;

/// Accepts records for background preview derivation.
pub trait PreviewScheduler: Send + Sync {
    /// Queue preview derivation for a freshly created record.
    ///
    /// Returns false when the job was not accepted (queue full or shut down).
    fn schedule(&self, record_id: Uuid) -> bool;
}

/// Scheduler that drops every job. Used where previews are produced by a later repair run.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPreviewScheduler;

impl PreviewScheduler for NoopPreviewScheduler {
    fn schedule(&self, record_id: Uuid) -> bool {
        tracing::debug!(record_id = %record_id, "Preview scheduling disabled, skipping");
        false
    }
}
