//! Clipstash Infrastructure Library
//!
//! Shared infrastructure used by the Clipstash binaries:
//! - Telemetry initialisation (tracing subscriber, text or JSON output)
//! - Error reports rendered from [`clipstash_core::AppError`]

pub mod error;
pub mod telemetry;

pub use error::ErrorReport;
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat, TelemetryConfig};
