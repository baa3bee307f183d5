//! Clipstash Core Library
//!
//! This crate provides core domain models, error types and configuration
//! shared across all Clipstash components.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod preview_scheduler;

// Re-export commonly used types
pub use config::{ClipstashConfig, PreviewConfig, StorageConfig, UploadConfig};
pub use error::{AppError, ErrorMetadata, LogLevel, StorageErrorKind};
pub use preview_scheduler::{NoopPreviewScheduler, PreviewScheduler};
