//! Free-space lookup.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::Disks;

/// Reports free bytes on the filesystem holding a path.
#[async_trait]
pub trait SpaceProbe: Send + Sync {
    async fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// Queries mounted disks through `sysinfo`, picking the deepest mount point that
/// contains the path.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoSpaceProbe;

impl SysinfoSpaceProbe {
    fn lookup(path: &Path) -> io::Result<u64> {
        let path = path.canonicalize()?;
        let disks = Disks::new_with_refreshed_list();

        disks
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("Could not determine disk space for path: {}", path.display()),
                )
            })
    }
}

#[async_trait]
impl SpaceProbe for SysinfoSpaceProbe {
    async fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::lookup(&path))
            .await
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("spawn_blocking for disk space check: {}", e),
                )
            })?
    }
}

/// Reports a fixed, adjustable amount of free space regardless of path.
#[derive(Debug, Default)]
pub struct FixedSpaceProbe {
    available: AtomicU64,
}

impl FixedSpaceProbe {
    pub fn new(available: u64) -> Self {
        Self {
            available: AtomicU64::new(available),
        }
    }

    pub fn set(&self, available: u64) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpaceProbe for FixedSpaceProbe {
    async fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.available.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_probe_is_adjustable() {
        let probe = FixedSpaceProbe::new(10);
        assert_eq!(probe.available_bytes(Path::new("/")).await.unwrap(), 10);
        probe.set(0);
        assert_eq!(probe.available_bytes(Path::new("/")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sysinfo_probe_missing_path_errors() {
        let err = SysinfoSpaceProbe
            .available_bytes(Path::new("/definitely/not/a/real/clipstash/path"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
