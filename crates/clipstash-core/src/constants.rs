//! Constants shared across crates.

/// Prefix reserved for in-flight temporary files. Anything carrying it is never a real asset.
pub const TEMP_FILE_PREFIX: &str = ".clipstash-tmp-";

/// Prefix of the marker file created by the storage write probe.
pub const PROBE_FILE_PREFIX: &str = ".clipstash-probe-";

/// Extension of per-chunk working files.
pub const CHUNK_FILE_EXTENSION: &str = "part";

/// Width of the zero-padded chunk index in working file names.
pub const CHUNK_INDEX_WIDTH: usize = 6;

/// Longest sanitized filename stem kept in final asset names.
pub const MAX_STEM_LEN: usize = 64;

/// Longest accepted upload session identifier.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Subdirectory of the storage root holding videos.
pub const VIDEO_SUBDIR: &str = "videos";

/// Subdirectory of the storage root holding screenshots.
pub const SCREENSHOT_SUBDIR: &str = "screenshots";

pub const BYTES_PER_MB: u64 = 1024 * 1024;
