//! Single-flight locking for cache paths.
//!
//! Two layers serialize writers of one cache path:
//! 1. a per-path keyed mutex for tasks within this process,
//! 2. an advisory lock on a sibling `.lock` file for other processes.
//!
//! Readers of the final file need neither, since the rename that publishes
//! a download is atomic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs4::fs_std::FileExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A map of lazily created per-path mutexes.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the in-process lock for a cache path, waiting if another
    /// task holds it.
    pub async fn lock(&self, key: &Path) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            map.entry(key.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

/// An exclusive advisory lock on a `.lock` companion file, held for the
/// duration of one download.
#[derive(Debug)]
pub struct FileLock {
    file: std::fs::File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock is acquired. The blocking syscall runs on the
    /// blocking pool so the async runtime keeps making progress.
    pub async fn acquire(path: &Path) -> std::io::Result<Self> {
        hoist_util::fs::ensure_parent(path)?;
        let path = path.to_path_buf();
        let (file, path) =
            tokio::task::spawn_blocking(move || -> std::io::Result<(std::fs::File, PathBuf)> {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .open(&path)?;
                file.lock_exclusive()?;
                Ok((file, path))
            })
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;
        Ok(Self { file, path })
    }

    /// Acquire without blocking; `None` if another process holds the lock.
    pub fn try_acquire(path: &Path) -> std::io::Result<Option<Self>> {
        hoist_util::fs::ensure_parent(path)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(true) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Ok(false) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        // Best-effort cleanup; a racing process may have re-created it
        let _ = std::fs::remove_file(&self.path);
    }
}
