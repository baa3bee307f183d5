//! Clipstash Storage Library
//!
//! Local filesystem primitives used by the upload path:
//!
//! - [`StorageHealthChecker`] verifies a directory is present, writable and has room
//!   for a payload plus a safety margin before anything is written.
//! - [`AtomicFileWriter`] writes through a reserved-prefix temporary file in the
//!   destination directory and renames it into place, so a partially written file is
//!   never visible under its final name.
//! - [`SpaceProbe`] abstracts free-space lookup so capacity scenarios can be tested
//!   without filling a disk.
//!
//! Temporary files always start with [`clipstash_core::constants::TEMP_FILE_PREFIX`];
//! [`reclaim_stale_temp_files`] removes the ones a crash left behind.

pub mod atomic;
pub mod error;
pub mod health;
pub mod reclaim;
pub mod space;

pub use atomic::{AtomicFileWriter, PendingWrite, WriteMode};
pub use error::{StorageError, StorageResult};
pub use health::{HealthFailure, StorageHealthChecker, StorageHealthReport};
pub use reclaim::reclaim_stale_temp_files;
pub use space::{FixedSpaceProbe, SpaceProbe, SysinfoSpaceProbe};
