//! Media classification, collision-resistant naming and record creation.

use clipstash_core::constants::MAX_STEM_LEN;
use clipstash_core::models::{MediaKind, MediaRecord, NewMediaRecord};
use clipstash_core::AppError;
use clipstash_db::MediaRecordRepository;
use std::sync::Arc;
use uuid::Uuid;

/// Accepted content types: (content type, kind, extension).
const ACCEPTED_TYPES: &[(&str, MediaKind, &str)] = &[
    ("video/mp4", MediaKind::Video, ".mp4"),
    ("video/quicktime", MediaKind::Video, ".mov"),
    ("video/webm", MediaKind::Video, ".webm"),
    ("video/x-matroska", MediaKind::Video, ".mkv"),
    ("image/png", MediaKind::Screenshot, ".png"),
    ("image/jpeg", MediaKind::Screenshot, ".jpg"),
    ("image/webp", MediaKind::Screenshot, ".webp"),
    ("image/gif", MediaKind::Screenshot, ".gif"),
];

/// Extra filename extensions mapped onto accepted content types.
const EXTENSION_ALIASES: &[(&str, &str)] = &[("jpeg", "image/jpeg"), ("m4v", "video/mp4")];

#[derive(Clone)]
pub struct MediaDescriptor {
    repository: Arc<dyn MediaRecordRepository>,
}

impl MediaDescriptor {
    pub fn new(repository: Arc<dyn MediaRecordRepository>) -> Self {
        Self { repository }
    }

    /// Map a declared content type onto a media kind and the extension for stored files.
    pub fn classify(content_type: &str) -> Result<(MediaKind, &'static str), AppError> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        ACCEPTED_TYPES
            .iter()
            .find(|(ct, _, _)| *ct == essence)
            .map(|(_, kind, ext)| (*kind, *ext))
            .ok_or_else(|| {
                let allowed: Vec<&str> = ACCEPTED_TYPES.iter().map(|(ct, _, _)| *ct).collect();
                AppError::Validation(format!(
                    "Unsupported content type '{}'. Allowed: {}",
                    content_type,
                    allowed.join(", ")
                ))
            })
    }

    /// Content type implied by a filename's extension, if it is one we accept.
    pub fn content_type_from_filename(filename: &str) -> Option<&'static str> {
        let ext = base_name(filename).rsplit_once('.')?.1.to_ascii_lowercase();

        ACCEPTED_TYPES
            .iter()
            .find(|(_, _, e)| e[1..] == ext)
            .map(|(ct, _, _)| *ct)
            .or_else(|| {
                EXTENSION_ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == ext)
                    .map(|(_, ct)| *ct)
            })
    }

    /// `<random token>_<sanitized stem><extension>`.
    ///
    /// The stem keeps ASCII letters, digits, `-` and `_`, is truncated to a bounded
    /// length and falls back to `upload` when nothing survives.
    pub fn unique_name(original_filename: &str, extension: &str) -> String {
        let name = base_name(original_filename);
        let stem = match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        };

        let mut sanitized = String::with_capacity(stem.len().min(MAX_STEM_LEN));
        for c in stem.chars() {
            if sanitized.len() >= MAX_STEM_LEN {
                break;
            }
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                sanitized.push(c);
            } else if !sanitized.ends_with('_') {
                sanitized.push('_');
            }
        }
        let sanitized = sanitized.trim_matches('_');
        let sanitized = if sanitized.is_empty() { "upload" } else { sanitized };

        format!("{}_{}{}", Uuid::new_v4().simple(), sanitized, extension)
    }

    /// Create the record for a committed file.
    ///
    /// If the insert fails, the committed file is deleted so no bytes are left without
    /// a row, and the database error is returned.
    pub async fn create_record(&self, record: NewMediaRecord) -> Result<MediaRecord, AppError> {
        debug_assert!(
            record.storage_path.is_absolute(),
            "storage path must be absolute"
        );
        if !record.storage_path.is_absolute() {
            return Err(AppError::Internal(format!(
                "Refusing to record relative storage path {}",
                record.storage_path.display()
            )));
        }

        let storage_path = record.storage_path.clone();
        match self.repository.insert(record).await {
            Ok(created) => {
                tracing::info!(
                    record_id = %created.id,
                    kind = %created.kind,
                    size_bytes = created.size_bytes,
                    path = %created.storage_path.display(),
                    "Media record created"
                );
                Ok(created)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %storage_path.display(),
                    "Failed to create media record, removing committed file"
                );
                if let Err(remove_err) = tokio::fs::remove_file(&storage_path).await {
                    tracing::error!(
                        error = %remove_err,
                        path = %storage_path.display(),
                        "Failed to remove file after record creation failure"
                    );
                }
                Err(e)
            }
        }
    }
}

fn base_name(filename: &str) -> &str {
    filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
}
