use clipstash_core::constants::{CHUNK_FILE_EXTENSION, CHUNK_INDEX_WIDTH};
use clipstash_core::models::{
    AssembledFile, ChunkReceipt, ChunkUpload, MediaRecord, UploadStatus,
};
use clipstash_core::{AppError, PreviewScheduler, StorageConfig, UploadConfig};
use clipstash_storage::{AtomicFileWriter, StorageError, StorageHealthChecker, WriteMode};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::descriptor::MediaDescriptor;
use crate::digest::normalize_digest;
use crate::session::{
    validate_session_id, AssemblyPlan, CancelOutcome, SessionRegistration, UploadSessionStore,
};
use crate::sniff::{sniff_kind, SNIFF_LEN};

const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Accepts chunks, detects completion and turns complete sessions into committed,
/// recorded files.
pub struct ChunkAssembler {
    storage: StorageConfig,
    limits: UploadConfig,
    sessions: UploadSessionStore,
    health: StorageHealthChecker,
    writer: AtomicFileWriter,
    descriptor: MediaDescriptor,
    scheduler: Arc<dyn PreviewScheduler>,
}

impl ChunkAssembler {
    pub fn new(
        storage: StorageConfig,
        limits: UploadConfig,
        health: StorageHealthChecker,
        writer: AtomicFileWriter,
        descriptor: MediaDescriptor,
        scheduler: Arc<dyn PreviewScheduler>,
    ) -> Self {
        Self {
            storage,
            limits,
            sessions: UploadSessionStore::new(),
            health,
            writer,
            descriptor,
            scheduler,
        }
    }

    pub fn sessions(&self) -> &UploadSessionStore {
        &self.sessions
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.storage.chunks_dir.join(session_id)
    }

    /// Store one chunk. The chunk that completes the session assembles the file on the
    /// caller's task and returns the new record id.
    #[tracing::instrument(skip(self, chunk), fields(session_id = %chunk.session_id, index = chunk.index))]
    pub async fn receive_chunk(&self, chunk: ChunkUpload) -> Result<ChunkReceipt, AppError> {
        let registration = self.validate(&chunk)?;
        self.sessions.register(&registration)?;

        let session_dir = self.session_dir(&chunk.session_id);
        fs::create_dir_all(&session_dir)
            .await
            .map_err(|e| StorageError::from_io(e, &session_dir, "Failed to create session directory"))?;

        self.writer
            .write(&session_dir, &chunk_file_name(chunk.index), &chunk.data, WriteMode::Replace)
            .await?;

        let outcome = match self
            .sessions
            .mark_received(&chunk.session_id, chunk.index, chunk.data.len() as u64)
        {
            Ok(outcome) => outcome,
            Err(AppError::SessionNotFound(id)) => {
                // Cancelled or reclaimed while the chunk was being written.
                remove_session_dir(&session_dir).await;
                return Err(AppError::SessionNotFound(id));
            }
            Err(e) => {
                // An index past the total can never join an assembly plan.
                if let Ok(Some(total)) = self.sessions.declared_total(&chunk.session_id) {
                    if chunk.index >= total {
                        remove_chunk_file(&session_dir, chunk.index).await;
                    }
                }
                return Err(e);
            }
        };

        tracing::debug!(
            received = outcome.received,
            total = outcome.total,
            size_bytes = chunk.data.len(),
            "Chunk stored"
        );

        let Some(plan) = outcome.assemble else {
            return Ok(ChunkReceipt {
                session_id: chunk.session_id,
                chunks_received: outcome.received,
                total_chunks: outcome.total,
                complete: false,
                record_id: None,
            });
        };

        let result = self.assemble(&plan, &session_dir).await;

        remove_session_dir(&session_dir).await;
        self.sessions.finish(&plan.session_id)?;

        let record = result?;
        if !self.scheduler.schedule(record.id) {
            tracing::warn!(
                record_id = %record.id,
                "Preview job not accepted; record stays without previews until repaired"
            );
        }

        Ok(ChunkReceipt {
            session_id: chunk.session_id,
            chunks_received: outcome.received,
            total_chunks: outcome.total,
            complete: true,
            record_id: Some(record.id),
        })
    }

    fn validate(&self, chunk: &ChunkUpload) -> Result<SessionRegistration, AppError> {
        validate_session_id(&chunk.session_id)?;

        if chunk.data.is_empty() {
            return Err(AppError::Validation("Chunk is empty".to_string()));
        }
        if chunk.data.len() as u64 > self.limits.max_chunk_size_bytes {
            return Err(AppError::Validation(format!(
                "Chunk of {} bytes exceeds the {} byte limit",
                chunk.data.len(),
                self.limits.max_chunk_size_bytes
            )));
        }
        if let Some(total) = chunk.total_chunks {
            if total == 0 || total > self.limits.max_chunks_per_upload {
                return Err(AppError::Validation(format!(
                    "Total chunk count must be between 1 and {}",
                    self.limits.max_chunks_per_upload
                )));
            }
        }
        if chunk.original_filename.trim().is_empty() {
            return Err(AppError::Validation(
                "Original filename is required".to_string(),
            ));
        }

        let expected_digest = chunk
            .expected_digest
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(normalize_digest)
            .transpose()?;

        Ok(SessionRegistration {
            session_id: chunk.session_id.clone(),
            index: chunk.index,
            total_chunks: chunk.total_chunks,
            original_filename: chunk.original_filename.clone(),
            content_type: chunk.content_type.clone(),
            expected_digest,
            owner_id: chunk.owner_id,
        })
    }

    /// Commit the file, then record it. A failed record insert removes the file again.
    async fn assemble(&self, plan: &AssemblyPlan, session_dir: &Path) -> Result<MediaRecord, AppError> {
        let started = Instant::now();
        let file = self.commit_file(plan, session_dir).await?;
        let size_bytes = file.size_bytes;

        let record = self
            .descriptor
            .create_record(file.into_new_record(plan.owner_id, plan.original_filename.clone()))
            .await?;

        tracing::info!(
            session_id = %plan.session_id,
            record_id = %record.id,
            chunks = plan.indices.len(),
            size_bytes = size_bytes,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Upload assembled"
        );

        Ok(record)
    }

    /// Concatenate by ascending index while hashing, verify and commit atomically.
    async fn commit_file(&self, plan: &AssemblyPlan, session_dir: &Path) -> Result<AssembledFile, AppError> {
        let media_dir = self.storage.media_dir(plan.kind);

        // Not recursive: a missing storage root must surface as NotMounted below.
        if let Err(e) = fs::create_dir(&media_dir).await {
            if e.kind() != io::ErrorKind::AlreadyExists {
                tracing::debug!(directory = %media_dir.display(), error = %e, "Media directory not created");
            }
        }
        self.health
            .check(&media_dir, plan.total_bytes)
            .await
            .into_result()?;

        let final_name = MediaDescriptor::unique_name(&plan.original_filename, plan.extension);
        let mut pending = self
            .writer
            .begin(&media_dir, &final_name, WriteMode::CreateNew)
            .await?;

        let mut hasher = Sha256::new();
        let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];

        for index in &plan.indices {
            let chunk_path = session_dir.join(chunk_file_name(*index));
            let mut file = fs::File::open(&chunk_path)
                .await
                .map_err(|e| StorageError::from_io(e, &chunk_path, "Failed to open chunk"))?;
            loop {
                let n = file
                    .read(&mut buf)
                    .await
                    .map_err(|e| StorageError::from_io(e, &chunk_path, "Failed to read chunk"))?;
                if n == 0 {
                    break;
                }
                let bytes = &buf[..n];
                hasher.update(bytes);
                if head.len() < SNIFF_LEN {
                    let take = (SNIFF_LEN - head.len()).min(n);
                    head.extend_from_slice(&bytes[..take]);
                }
                pending.write_all(bytes).await?;
            }
        }

        let digest = hex::encode(hasher.finalize());

        if let Some(expected) = &plan.expected_digest {
            if *expected != digest {
                pending.abort().await;
                tracing::warn!(
                    session_id = %plan.session_id,
                    expected = %expected,
                    actual = %digest,
                    "Assembled upload failed integrity check"
                );
                return Err(AppError::Integrity {
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }

        if let Some(sniffed) = sniff_kind(&head) {
            if sniffed != plan.kind {
                pending.abort().await;
                return Err(AppError::Validation(format!(
                    "File content is a {} but was declared as a {}",
                    sniffed, plan.kind
                )));
            }
        }

        let size_bytes = pending.bytes_written();
        let path = pending.commit().await?;

        Ok(AssembledFile {
            path,
            size_bytes,
            digest,
            kind: plan.kind,
        })
    }

    pub fn status(&self, session_id: &str) -> Result<UploadStatus, AppError> {
        self.sessions
            .status(session_id)?
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))
    }

    /// Cancel an open session and delete its working files. Unknown, finished and
    /// assembling sessions are left as they are.
    pub async fn cancel(&self, session_id: &str) -> Result<(), AppError> {
        match self.sessions.cancel(session_id)? {
            CancelOutcome::Removed => {
                if validate_session_id(session_id).is_ok() {
                    remove_session_dir(&self.session_dir(session_id)).await;
                }
                tracing::info!(session_id = %session_id, "Upload session cancelled");
            }
            CancelOutcome::AssemblyInProgress => {
                tracing::debug!(session_id = %session_id, "Cancel ignored, assembly in progress");
            }
            CancelOutcome::Unknown => {
                tracing::debug!(session_id = %session_id, "Cancel ignored, no such session");
            }
        }
        Ok(())
    }

    /// Evict open sessions idle for at least `max_idle` and delete their working files.
    pub async fn reclaim_idle(&self, max_idle: Duration) -> Result<usize, AppError> {
        let idle = self.sessions.take_idle(max_idle)?;
        for session_id in &idle {
            remove_session_dir(&self.session_dir(session_id)).await;
            tracing::info!(session_id = %session_id, "Reclaimed idle upload session");
        }
        Ok(idle.len())
    }

    /// Delete working directories with no live session whose last modification is at
    /// least `older_than` ago, e.g. left behind by a restart.
    pub async fn reclaim_orphaned_dirs(&self, older_than: Duration) -> Result<usize, AppError> {
        let chunks_dir = &self.storage.chunks_dir;
        let mut entries = match fs::read_dir(chunks_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(StorageError::from_io(e, chunks_dir, "Failed to list chunks directory").into())
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(e, chunks_dir, "Failed to list chunks directory"))?
        {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.sessions.contains(&name)? {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age < older_than {
                continue;
            }

            remove_session_dir(&entry.path()).await;
            removed += 1;
        }

        if removed > 0 {
            tracing::info!(removed = removed, "Reclaimed orphaned chunk directories");
        }
        Ok(removed)
    }
}

/// `<index zero-padded>.part`
pub fn chunk_file_name(index: u32) -> String {
    format!(
        "{:0width$}.{}",
        index,
        CHUNK_FILE_EXTENSION,
        width = CHUNK_INDEX_WIDTH
    )
}

async fn remove_chunk_file(session_dir: &Path, index: u32) {
    let path = session_dir.join(chunk_file_name(index));
    if let Err(e) = fs::remove_file(&path).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove rejected chunk");
        }
    }
}

async fn remove_session_dir(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(
                directory = %dir.display(),
                error = %e,
                "Failed to remove chunk working directory"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_file_name() {
        assert_eq!(chunk_file_name(0), "000000.part");
        assert_eq!(chunk_file_name(42), "000042.part");
    }
}
