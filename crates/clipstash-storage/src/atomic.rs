//! Atomic file commit: temp file in the destination directory, fsync, rename.

use bytes::Bytes;
use clipstash_core::constants::TEMP_FILE_PREFIX;
use clipstash_core::StorageErrorKind;
use futures::{Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::space::SpaceProbe;

/// What to do when the final name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with `WriteFailed`; used for final assets.
    CreateNew,
    /// Atomically replace the existing file.
    Replace,
}

/// Writes files so they appear under their final name complete or not at all.
#[derive(Clone)]
pub struct AtomicFileWriter {
    space: Arc<dyn SpaceProbe>,
}

impl AtomicFileWriter {
    /// `space` is consulted only to attach free-space diagnostics to disk-full errors.
    pub fn new(space: Arc<dyn SpaceProbe>) -> Self {
        Self { space }
    }

    /// Open a temporary file next to `directory/final_name` for incremental writes.
    pub async fn begin(
        &self,
        directory: &Path,
        final_name: &str,
        mode: WriteMode,
    ) -> StorageResult<PendingWrite> {
        validate_final_name(directory, final_name)?;

        let final_path = directory.join(final_name);
        if mode == WriteMode::CreateNew && fs::try_exists(&final_path).await.unwrap_or(false) {
            return Err(StorageError::new(
                StorageErrorKind::WriteFailed,
                final_path,
                "destination already exists",
            ));
        }

        let temp_path = directory.join(format!(
            "{}{}.{}",
            TEMP_FILE_PREFIX,
            Uuid::new_v4().simple(),
            final_name
        ));

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .map_err(|e| StorageError::from_io(e, directory, "Failed to create temporary file"))?;

        Ok(PendingWrite {
            file: Some(file),
            temp_path,
            final_path,
            directory: directory.to_path_buf(),
            mode,
            written: 0,
            started: Instant::now(),
            space: Arc::clone(&self.space),
            finished: false,
        })
    }

    /// Write `data` atomically to `directory/final_name`.
    pub async fn write(
        &self,
        directory: &Path,
        final_name: &str,
        data: &[u8],
        mode: WriteMode,
    ) -> StorageResult<PathBuf> {
        let mut pending = self.begin(directory, final_name, mode).await?;
        pending.write_all(data).await?;
        pending.commit().await
    }

    /// Drain a byte stream atomically into `directory/final_name`.
    ///
    /// Returns the final path and number of bytes written.
    pub async fn write_stream<S>(
        &self,
        directory: &Path,
        final_name: &str,
        mut stream: S,
        mode: WriteMode,
    ) -> StorageResult<(PathBuf, u64)>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let mut pending = self.begin(directory, final_name, mode).await?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                StorageError::new(
                    StorageErrorKind::WriteFailed,
                    directory,
                    format!("Source stream failed: {}", e),
                )
            })?;
            pending.write_all(&chunk).await?;
        }
        let written = pending.bytes_written();
        let path = pending.commit().await?;
        Ok((path, written))
    }
}

/// An in-progress atomic write. Dropping it without [`PendingWrite::commit`] removes
/// the temporary file.
pub struct PendingWrite {
    file: Option<fs::File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    directory: PathBuf,
    mode: WriteMode,
    written: u64,
    started: Instant,
    space: Arc<dyn SpaceProbe>,
    finished: bool,
}

impl PendingWrite {
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> StorageResult<()> {
        let result = match self.file.as_mut() {
            Some(file) => file.write_all(buf).await,
            None => Err(io::Error::new(io::ErrorKind::Other, "write after close")),
        };
        match result {
            Ok(()) => {
                self.written += buf.len() as u64;
                Ok(())
            }
            Err(e) => Err(self.io_error(e, "Failed to write temporary file").await),
        }
    }

    /// Flush, fsync, move onto the final name and fsync the directory.
    pub async fn commit(mut self) -> StorageResult<PathBuf> {
        let Some(mut file) = self.file.take() else {
            return Err(StorageError::new(
                StorageErrorKind::WriteFailed,
                &self.temp_path,
                "temporary file already closed",
            ));
        };

        if let Err(e) = file.flush().await {
            return Err(self.io_error(e, "Failed to flush temporary file").await);
        }
        if let Err(e) = file.sync_all().await {
            return Err(self.io_error(e, "Failed to sync temporary file").await);
        }
        drop(file);

        match self.mode {
            // A hard link refuses an existing destination, so a file that appeared
            // since `begin` is never replaced.
            WriteMode::CreateNew => match fs::hard_link(&self.temp_path, &self.final_path).await {
                Ok(()) => {
                    if let Err(e) = fs::remove_file(&self.temp_path).await {
                        tracing::warn!(
                            path = %self.temp_path.display(),
                            error = %e,
                            "Failed to remove temporary file after linking"
                        );
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    return Err(StorageError::new(
                        StorageErrorKind::WriteFailed,
                        &self.final_path,
                        "destination already exists",
                    ));
                }
                Err(e) => return Err(self.io_error(e, "Failed to link into place").await),
            },
            WriteMode::Replace => {
                if let Err(e) = fs::rename(&self.temp_path, &self.final_path).await {
                    return Err(self.io_error(e, "Failed to rename into place").await);
                }
            }
        }
        self.finished = true;

        sync_directory(&self.directory).await;

        tracing::debug!(
            path = %self.final_path.display(),
            size_bytes = self.written,
            duration_ms = self.started.elapsed().as_secs_f64() * 1000.0,
            "Atomic write committed"
        );

        Ok(self.final_path.clone())
    }

    /// Discard the write and remove the temporary file.
    pub async fn abort(mut self) {
        self.file.take();
        self.finished = true;
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.temp_path.display(),
                    error = %e,
                    "Failed to remove temporary file"
                );
            }
        }
    }

    async fn io_error(&self, err: io::Error, context: &str) -> StorageError {
        let err = StorageError::from_io(err, &self.final_path, context);
        if err.is_disk_full() {
            let available = self.space.available_bytes(&self.directory).await.ok();
            tracing::error!(
                path = %self.final_path.display(),
                bytes_written = self.written,
                available_bytes = ?available,
                "Disk full while writing"
            );
            return err.with_available_bytes(available);
        }
        err
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if !self.finished {
            self.file.take();
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

fn validate_final_name(directory: &Path, name: &str) -> StorageResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.starts_with(TEMP_FILE_PREFIX);
    if invalid {
        return Err(StorageError::new(
            StorageErrorKind::WriteFailed,
            directory,
            format!("invalid file name: {:?}", name),
        ));
    }
    Ok(())
}

#[cfg(unix)]
async fn sync_directory(directory: &Path) {
    match fs::File::open(directory).await {
        Ok(dir) => {
            if let Err(e) = dir.sync_all().await {
                tracing::debug!(directory = %directory.display(), error = %e, "Directory fsync failed");
            }
        }
        Err(e) => {
            tracing::debug!(directory = %directory.display(), error = %e, "Directory open for fsync failed");
        }
    }
}

#[cfg(not(unix))]
async fn sync_directory(_directory: &Path) {}
