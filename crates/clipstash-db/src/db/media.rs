use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clipstash_core::models::{DerivedMedia, MediaKind, MediaRecord, NewMediaRecord};
use clipstash_core::AppError;
use sqlx::PgPool;
use std::path::PathBuf;
use uuid::Uuid;

use super::transaction::TransactionGuard;

/// Persistence seam for media records.
///
/// The upload path needs exactly one insert; the thumbnail pipeline needs one read and
/// one update per record, plus a scan for records still missing previews.
#[async_trait]
pub trait MediaRecordRepository: Send + Sync {
    /// Insert a record in a single transaction. Preview and metadata fields start empty.
    async fn insert(&self, record: NewMediaRecord) -> Result<MediaRecord, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, AppError>;

    /// Write derived metadata and preview paths in one update.
    ///
    /// Returns false when the record no longer exists.
    async fn apply_derived(&self, id: Uuid, derived: &DerivedMedia) -> Result<bool, AppError>;

    /// Live records without a JPEG preview, oldest first.
    async fn list_missing_previews(&self, limit: i64) -> Result<Vec<MediaRecord>, AppError>;
}

#[derive(sqlx::FromRow)]
struct MediaRecordRow {
    id: Uuid,
    owner_id: Uuid,
    original_filename: String,
    filename: String,
    storage_path: String,
    size_bytes: i64,
    kind: MediaKind,
    content_digest: String,
    duration_secs: Option<f64>,
    width: Option<i32>,
    height: Option<i32>,
    preview_webp_path: Option<String>,
    preview_jpeg_path: Option<String>,
    created_at: DateTime<Utc>,
    is_deleted: bool,
}

impl From<MediaRecordRow> for MediaRecord {
    fn from(row: MediaRecordRow) -> Self {
        MediaRecord {
            id: row.id,
            owner_id: row.owner_id,
            original_filename: row.original_filename,
            filename: row.filename,
            storage_path: PathBuf::from(row.storage_path),
            size_bytes: row.size_bytes.max(0) as u64,
            kind: row.kind,
            content_digest: row.content_digest,
            duration_secs: row.duration_secs,
            width: row.width.map(|w| w.max(0) as u32),
            height: row.height.map(|h| h.max(0) as u32),
            preview_webp_path: row.preview_webp_path.map(PathBuf::from),
            preview_jpeg_path: row.preview_jpeg_path.map(PathBuf::from),
            created_at: row.created_at,
            is_deleted: row.is_deleted,
        }
    }
}

const RECORD_COLUMNS: &str = r#"
    id, owner_id, original_filename, filename, storage_path, size_bytes, kind,
    content_digest, duration_secs, width, height, preview_webp_path, preview_jpeg_path,
    created_at, is_deleted
"#;

fn path_text(path: &std::path::Path) -> Result<String, AppError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| AppError::Internal(format!("Path is not valid UTF-8: {}", path.display())))
}

/// PostgreSQL-backed repository.
#[derive(Clone)]
pub struct PgMediaRepository {
    pool: PgPool,
}

impl PgMediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaRecordRepository for PgMediaRepository {
    #[tracing::instrument(skip(self, record), fields(filename = %record.filename))]
    async fn insert(&self, record: NewMediaRecord) -> Result<MediaRecord, AppError> {
        let storage_path = path_text(&record.storage_path)?;
        let id = Uuid::new_v4();

        let mut tx = TransactionGuard::begin(&self.pool).await?;

        let row = sqlx::query_as::<_, MediaRecordRow>(&format!(
            r#"
            INSERT INTO media_records (
                id, owner_id, original_filename, filename, storage_path,
                size_bytes, kind, content_digest
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(record.owner_id)
        .bind(&record.original_filename)
        .bind(&record.filename)
        .bind(storage_path)
        .bind(record.size_bytes as i64)
        .bind(record.kind)
        .bind(&record.content_digest)
        .fetch_one(tx.conn())
        .await?;

        tx.commit().await?;

        tracing::debug!(record_id = %id, "Media record inserted");

        Ok(row.into())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, AppError> {
        let row = sqlx::query_as::<_, MediaRecordRow>(&format!(
            "SELECT {} FROM media_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MediaRecord::from))
    }

    async fn apply_derived(&self, id: Uuid, derived: &DerivedMedia) -> Result<bool, AppError> {
        let webp = derived.preview_webp_path.as_deref().map(path_text).transpose()?;
        let jpeg = derived.preview_jpeg_path.as_deref().map(path_text).transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE media_records
            SET duration_secs = $2,
                width = $3,
                height = $4,
                preview_webp_path = $5,
                preview_jpeg_path = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(derived.duration_secs)
        .bind(derived.width.map(|w| w as i32))
        .bind(derived.height.map(|h| h as i32))
        .bind(webp)
        .bind(jpeg)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_missing_previews(&self, limit: i64) -> Result<Vec<MediaRecord>, AppError> {
        let rows = sqlx::query_as::<_, MediaRecordRow>(&format!(
            r#"
            SELECT {}
            FROM media_records
            WHERE preview_jpeg_path IS NULL AND is_deleted = FALSE
            ORDER BY created_at ASC
            LIMIT $1
            "#,
            RECORD_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MediaRecord::from).collect())
    }
}
