//! Data models for the upload and processing pipeline.

mod media;
mod upload;

pub use media::*;
pub use upload::*;
