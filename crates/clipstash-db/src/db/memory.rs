use async_trait::async_trait;
use chrono::Utc;
use clipstash_core::models::{DerivedMedia, MediaRecord, NewMediaRecord};
use clipstash_core::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::media::MediaRecordRepository;

/// Process-local repository. Used by tests and by CLI runs without `DATABASE_URL`.
#[derive(Clone, Default)]
pub struct InMemoryMediaRepository {
    records: Arc<Mutex<HashMap<Uuid, MediaRecord>>>,
    fail_inserts: Arc<AtomicBool>,
}

impl InMemoryMediaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent inserts fail with a database error.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Hard-delete a record, as a concurrent external delete would.
    pub fn remove(&self, id: Uuid) -> Option<MediaRecord> {
        self.lock().ok()?.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<MediaRecord> {
        self.lock()
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, MediaRecord>>, AppError> {
        self.records
            .lock()
            .map_err(|_| AppError::Internal("In-memory repository lock poisoned".to_string()))
    }
}

#[async_trait]
impl MediaRecordRepository for InMemoryMediaRepository {
    async fn insert(&self, record: NewMediaRecord) -> Result<MediaRecord, AppError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolClosed));
        }

        let created = MediaRecord {
            id: Uuid::new_v4(),
            owner_id: record.owner_id,
            original_filename: record.original_filename,
            filename: record.filename,
            storage_path: record.storage_path,
            size_bytes: record.size_bytes,
            kind: record.kind,
            content_digest: record.content_digest,
            duration_secs: None,
            width: None,
            height: None,
            preview_webp_path: None,
            preview_jpeg_path: None,
            created_at: Utc::now(),
            is_deleted: false,
        };

        self.lock()?.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, AppError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn apply_derived(&self, id: Uuid, derived: &DerivedMedia) -> Result<bool, AppError> {
        let mut records = self.lock()?;
        let Some(record) = records.get_mut(&id) else {
            return Ok(false);
        };

        record.duration_secs = derived.duration_secs;
        record.width = derived.width;
        record.height = derived.height;
        record.preview_webp_path = derived.preview_webp_path.clone();
        record.preview_jpeg_path = derived.preview_jpeg_path.clone();
        Ok(true)
    }

    async fn list_missing_previews(&self, limit: i64) -> Result<Vec<MediaRecord>, AppError> {
        let mut missing: Vec<MediaRecord> = self
            .lock()?
            .values()
            .filter(|r| r.preview_jpeg_path.is_none() && !r.is_deleted)
            .cloned()
            .collect();
        missing.sort_by_key(|r| r.created_at);
        missing.truncate(limit.max(0) as usize);
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipstash_core::models::MediaKind;
    use std::path::PathBuf;

    fn new_record(name: &str) -> NewMediaRecord {
        NewMediaRecord {
            owner_id: Uuid::new_v4(),
            original_filename: format!("{}.mp4", name),
            filename: format!("abc_{}.mp4", name),
            storage_path: PathBuf::from(format!("/srv/clips/videos/abc_{}.mp4", name)),
            size_bytes: 2560,
            kind: MediaKind::Video,
            content_digest: "00".repeat(32),
        }
    }

    #[tokio::test]
    async fn test_insert_starts_without_previews() {
        let repo = InMemoryMediaRepository::new();
        let record = repo.insert(new_record("a")).await.unwrap();
        assert!(record.preview_jpeg_path.is_none());
        assert!(record.duration_secs.is_none());
        assert!(!record.is_deleted);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_is_database_error() {
        let repo = InMemoryMediaRepository::new();
        repo.set_fail_inserts(true);
        let err = repo.insert(new_record("a")).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_apply_derived_on_missing_record_is_noop() {
        let repo = InMemoryMediaRepository::new();
        let applied = repo
            .apply_derived(Uuid::new_v4(), &DerivedMedia::default())
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn test_missing_previews_listing() {
        let repo = InMemoryMediaRepository::new();
        let a = repo.insert(new_record("a")).await.unwrap();
        let b = repo.insert(new_record("b")).await.unwrap();

        let derived = DerivedMedia {
            preview_jpeg_path: Some(PathBuf::from("/srv/clips/previews/abc_a.jpg")),
            ..Default::default()
        };
        assert!(repo.apply_derived(a.id, &derived).await.unwrap());

        let missing = repo.list_missing_previews(10).await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, b.id);
        assert!(repo.list_missing_previews(0).await.unwrap().is_empty());
    }
}
