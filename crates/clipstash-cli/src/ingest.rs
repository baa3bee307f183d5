//! Push a local file through the chunked upload path, the way a client would.

use anyhow::Context;
use bytes::Bytes;
use clipstash_core::models::ChunkUpload;
use clipstash_upload::ChunkAssembler;
use rand::seq::SliceRandom;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::path::Path;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub chunk_size: u64,
    /// Send chunks in random order.
    pub shuffle: bool,
    pub owner_id: Uuid,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub session_id: String,
    pub record_id: Uuid,
    pub chunks: u32,
    pub size_bytes: u64,
    pub digest: String,
    pub duration_ms: u128,
}

/// Number of `chunk_size` chunks needed for `len` bytes.
pub fn chunk_count(len: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    len.div_ceil(chunk_size)
}

/// Indices `0..total`, shuffled when asked.
pub fn chunk_order(total: u32, shuffle: bool) -> Vec<u32> {
    let mut order: Vec<u32> = (0..total).collect();
    if shuffle {
        order.shuffle(&mut rand::rng());
    }
    order
}

/// Lowercase hex SHA-256 of a file, read in 256 KiB blocks.
pub async fn file_digest(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Upload `path` as one session and return the committed record.
///
/// Every chunk declares the total and the digest. The preview job is handed to the
/// assembler's scheduler as usual.
pub async fn ingest_file(
    assembler: &ChunkAssembler,
    path: &Path,
    options: &IngestOptions,
) -> anyhow::Result<IngestSummary> {
    let start = Instant::now();
    let size_bytes = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    if size_bytes == 0 {
        anyhow::bail!("{} is empty", path.display());
    }

    let total = u32::try_from(chunk_count(size_bytes, options.chunk_size))
        .context("File needs too many chunks, raise --chunk-size-kb")?;
    if total == 0 {
        anyhow::bail!("Chunk size must be greater than 0");
    }

    let original_filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Path has no file name")?;
    let digest = file_digest(path)
        .await
        .with_context(|| format!("Failed to hash {}", path.display()))?;
    let session_id = Uuid::new_v4().simple().to_string();

    tracing::info!(
        session_id = %session_id,
        size_bytes = size_bytes,
        chunks = total,
        shuffle = options.shuffle,
        "Ingesting file"
    );

    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut record_id = None;

    for index in chunk_order(total, options.shuffle) {
        file.seek(SeekFrom::Start(index as u64 * options.chunk_size))
            .await?;
        let mut data = Vec::with_capacity(options.chunk_size as usize);
        (&mut file)
            .take(options.chunk_size)
            .read_to_end(&mut data)
            .await?;

        let receipt = assembler
            .receive_chunk(ChunkUpload {
                session_id: session_id.clone(),
                index,
                total_chunks: Some(total),
                original_filename: original_filename.clone(),
                content_type: options.content_type.clone(),
                expected_digest: Some(digest.clone()),
                owner_id: options.owner_id,
                data: Bytes::from(data),
            })
            .await?;

        tracing::debug!(
            session_id = %session_id,
            index = index,
            received = receipt.chunks_received,
            "Chunk accepted"
        );
        if receipt.record_id.is_some() {
            record_id = receipt.record_id;
        }
    }

    let record_id = record_id.context("Upload did not complete after sending every chunk")?;
    Ok(IngestSummary {
        session_id,
        record_id,
        chunks: total,
        size_bytes,
        digest,
        duration_ms: start.elapsed().as_millis(),
    })
}
