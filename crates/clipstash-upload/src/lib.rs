//! Chunked upload assembly.
//!
//! [`ChunkAssembler`] accepts chunks in any order, tracks them in an
//! [`UploadSessionStore`], and on the last distinct chunk reassembles the file by
//! ascending index while hashing it, gates the write on storage health, commits it
//! atomically and creates the record through [`MediaDescriptor`]. Preview derivation
//! is handed to a [`clipstash_core::PreviewScheduler`] and never blocks the caller.

pub mod assembler;
pub mod descriptor;
pub mod digest;
pub mod session;
pub mod sniff;

pub use assembler::ChunkAssembler;
pub use descriptor::MediaDescriptor;
pub use session::{CancelOutcome, UploadSessionStore};
