// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fs4::fs_std::FileExt;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The on-disk lock could not be acquired within the timeout
    #[error("KB '{0}' lock timed out")]
    Timeout(String),
    #[error("KB lock I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serializes all working-tree mutations per KB.
///
/// Two layers: a per-KB `tokio::sync::Mutex` (FIFO, so cooperating tasks in
/// this process are served in arrival order) and an exclusive lock on
/// `<kb_root>/.lock` (so cooperating processes serialize too).  Both are
/// released when the returned [`KbGuard`] drops, on every exit path.
pub struct KbLockManager {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    file_lock_timeout: Duration,
}

impl KbLockManager {
    pub fn new(file_lock_timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            file_lock_timeout,
        }
    }

    /// Enter the critical section for `kb_id`.
    ///
    /// `reason` is carried into the logs so contended sections are easy to
    /// attribute.  Not re-entrant: a task that already holds the guard must
    /// not call `lock` again for the same KB.
    pub async fn lock(
        &self,
        kb_id: &str,
        kb_root: &Path,
        reason: &str,
    ) -> Result<KbGuard, LockError> {
        let mutex = {
            let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                map.entry(kb_id.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };

        debug!(kb_id, reason, "waiting for KB lock");
        let mem = mutex.lock_owned().await;

        let lock_path = kb_root.join(".lock");
        let file = match acquire_file_lock(&lock_path, self.file_lock_timeout).await {
            Ok(f) => f,
            Err(e) => {
                // The in-process guard drops here, keeping both layers
                // consistent on the error path.
                drop(mem);
                return Err(e);
            }
        };

        debug!(kb_id, reason, "KB lock acquired");
        Ok(KbGuard {
            kb_id: kb_id.to_string(),
            _mem: mem,
            file: Some(file),
            lock_path,
        })
    }
}

async fn acquire_file_lock(lock_path: &Path, timeout: Duration) -> Result<File, LockError> {
    if let Some(parent) = lock_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let path = lock_path.to_path_buf();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let p = path.clone();
        // File locking is a blocking syscall; keep it off the runtime threads.
        let attempt = tokio::task::spawn_blocking(move || -> std::io::Result<Option<File>> {
            let file = File::create(&p)?;
            match file.try_lock_exclusive()? {
                true => Ok(Some(file)),
                false => Ok(None),
            }
        })
        .await
        .map_err(|e| LockError::Io(std::io::Error::other(e)))??;

        if let Some(file) = attempt {
            return Ok(file);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(LockError::Timeout(path.display().to_string()));
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Scoped critical section handle.  Dropping releases the on-disk lock
/// first, then the in-process mutex.
pub struct KbGuard {
    kb_id: String,
    _mem: OwnedMutexGuard<()>,
    file: Option<File>,
    lock_path: PathBuf,
}

impl KbGuard {
    pub fn kb_id(&self) -> &str {
        &self.kb_id
    }
}

impl Drop for KbGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                warn!(
                    kb_id = %self.kb_id,
                    path = %self.lock_path.display(),
                    error = %e,
                    "failed to release KB file lock"
                );
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
