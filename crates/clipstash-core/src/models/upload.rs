use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::media::{MediaKind, NewMediaRecord};

/// One chunk of a client-driven upload, as handed over by the transport layer.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    /// Opaque client-chosen session identifier.
    pub session_id: String,
    /// Zero-based position of this chunk.
    pub index: u32,
    /// Declared chunk count; may be omitted until the client knows it.
    pub total_chunks: Option<u32>,
    pub original_filename: String,
    /// Declared content type (e.g. `video/mp4`). Derived from the filename when absent.
    pub content_type: Option<String>,
    /// Hex SHA-256 of the whole file, if the client supplies one.
    pub expected_digest: Option<String>,
    pub owner_id: Uuid,
    pub data: Bytes,
}

/// Answer to a chunk upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReceipt {
    pub session_id: String,
    pub chunks_received: u32,
    /// Zero while the total is unknown.
    pub total_chunks: u32,
    pub complete: bool,
    /// Set on the chunk that completed the upload.
    pub record_id: Option<Uuid>,
}

/// Lifecycle of a live upload session. Sessions are dropped once assembly ends or
/// the client cancels, so status queries only ever see these two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepting chunks.
    Open,
    /// Every chunk is present and the file is being concatenated and committed.
    Assembling,
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub session_id: String,
    pub chunks_received: u32,
    /// Zero while the total is unknown.
    pub total_chunks: u32,
    pub complete: bool,
    pub state: SessionState,
}

/// A reassembled file that passed integrity verification and was atomically committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Hex SHA-256 of the committed bytes.
    pub digest: String,
    pub kind: MediaKind,
}

impl AssembledFile {
    /// Name of the committed file within its media directory.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The record describing this file.
    pub fn into_new_record(self, owner_id: Uuid, original_filename: String) -> NewMediaRecord {
        NewMediaRecord {
            owner_id,
            original_filename,
            filename: self.file_name(),
            storage_path: self.path,
            size_bytes: self.size_bytes,
            kind: self.kind,
            content_digest: self.digest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembled_file_into_new_record() {
        let file = AssembledFile {
            path: PathBuf::from("/srv/clips/videos/0f3a_my_clip.mp4"),
            size_bytes: 2560,
            digest: "ab".repeat(32),
            kind: MediaKind::Video,
        };
        assert_eq!(file.file_name(), "0f3a_my_clip.mp4");

        let owner = Uuid::from_u128(7);
        let record = file.into_new_record(owner, "My Clip.mp4".to_string());
        assert_eq!(record.filename, "0f3a_my_clip.mp4");
        assert_eq!(record.original_filename, "My Clip.mp4");
        assert_eq!(record.storage_path, PathBuf::from("/srv/clips/videos/0f3a_my_clip.mp4"));
        assert_eq!(record.size_bytes, 2560);
        assert_eq!(record.owner_id, owner);
        assert_eq!(record.content_digest, "ab".repeat(32));
    }

    #[test]
    fn test_session_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionState::Assembling).unwrap(),
            "\"assembling\""
        );
    }
}
