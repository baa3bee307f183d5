use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Closed classification of an asset; drives storage subdirectory and processing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "media_kind", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Screenshot,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Screenshot => "screenshot",
        }
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" => Ok(MediaKind::Video),
            "screenshot" => Ok(MediaKind::Screenshot),
            _ => Err(anyhow::anyhow!("Invalid media kind: {}", s)),
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Persisted media asset.
///
/// `storage_path` is always absolute. Preview and metadata fields start out empty and
/// are filled at most once by the thumbnail pipeline; an asset without previews is a
/// complete, usable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub original_filename: String,
    pub filename: String,
    pub storage_path: PathBuf,
    pub size_bytes: u64,
    pub kind: MediaKind,
    /// Hex SHA-256 of the stored bytes.
    pub content_digest: String,
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub preview_webp_path: Option<PathBuf>,
    pub preview_jpeg_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl MediaRecord {
    pub fn has_preview(&self) -> bool {
        self.preview_jpeg_path.is_some()
    }
}

/// Fields needed to create a [`MediaRecord`].
#[derive(Debug, Clone)]
pub struct NewMediaRecord {
    pub owner_id: Uuid,
    pub original_filename: String,
    pub filename: String,
    pub storage_path: PathBuf,
    pub size_bytes: u64,
    pub kind: MediaKind,
    pub content_digest: String,
}

/// Result of preview derivation, written to a record in one update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedMedia {
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub preview_webp_path: Option<PathBuf>,
    pub preview_jpeg_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_round_trips_through_str() {
        assert_eq!("video".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert_eq!("Screenshot".parse::<MediaKind>().unwrap(), MediaKind::Screenshot);
        assert!("audio".parse::<MediaKind>().is_err());
        assert_eq!(MediaKind::Video.to_string(), "video");
    }

    #[test]
    fn test_media_kind_serializes_lowercase() {
        let json = serde_json::to_string(&MediaKind::Screenshot).unwrap();
        assert_eq!(json, "\"screenshot\"");
    }
}
