//! Tracing initialisation
//!
//! Filtering follows `RUST_LOG`; without it the default filter applies. Output is
//! human-readable text unless `LOG_FORMAT=json`.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry, LogFormat, TelemetryConfig};
