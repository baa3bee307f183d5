//! Operator tooling for Clipstash: service wiring and local-file ingestion.

pub mod ingest;
pub mod services;

pub use ingest::{chunk_order, chunk_count, file_digest, ingest_file, IngestOptions, IngestSummary};
pub use services::Services;
