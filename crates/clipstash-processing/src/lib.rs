//! Preview derivation for stored media.
//!
//! [`ThumbnailPipeline`] probes a stored file with ffprobe, renders a JPEG preview and
//! then a WebP preview with ffmpeg, and writes everything back to the record in one
//! update. Tool invocations are bounded by timeouts; tool absence is detected once by
//! [`MediaTools`] and reported as a configuration error rather than retried per file.

pub mod error;
pub mod pipeline;
pub mod preview;
pub mod probe;
pub mod tools;

pub use error::ToolError;
pub use pipeline::{PipelineReport, PreviewOutcome, RepairSummary, ThumbnailPipeline};
pub use preview::PreviewFormat;
pub use probe::ProbeMetadata;
pub use tools::{MediaTools, ToolVersions};
