// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Completed,
    Failed,
}

/// One line of the append-only processing log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub content_hash: String,
    pub user_id: i64,
    pub status: ProcessingStatus,
    /// KB-relative path of the note this content became, on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kb_file: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessingRecord {
    pub fn completed(content_hash: impl Into<String>, user_id: i64, kb_file: Option<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            user_id,
            status: ProcessingStatus::Completed,
            kb_file,
            processed_at: Utc::now(),
        }
    }

    pub fn failed(content_hash: impl Into<String>, user_id: i64) -> Self {
        Self {
            content_hash: content_hash.into(),
            user_id,
            status: ProcessingStatus::Failed,
            kb_file: None,
            processed_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Another process held the log lock past the configured timeout
    #[error("processing log is busy")]
    Busy,
    #[error("processing log I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("processing record serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Content-hash deduplication log.
///
/// Reads are answered from an in-memory index rebuilt by scanning the JSONL
/// log at open time; writes append one line under a cross-process exclusive
/// file lock and flush before the lock is released, so `is_processed` holds
/// in every process once `record` has returned.
pub struct ProcessingTracker {
    log_path: PathBuf,
    lock_timeout: Duration,
    index: Mutex<HashMap<String, ProcessingRecord>>,
    skipped_lines: usize,
}

impl ProcessingTracker {
    pub fn open(log_path: impl Into<PathBuf>, lock_timeout: Duration) -> Result<Self, TrackerError> {
        let log_path = log_path.into();
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut index = HashMap::new();
        let mut skipped = 0usize;
        if log_path.is_file() {
            let file = std::fs::File::open(&log_path)?;
            for (lineno, line) in BufReader::new(file).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ProcessingRecord>(&line) {
                    Ok(rec) => {
                        insert_record(&mut index, rec);
                    }
                    Err(e) => {
                        skipped += 1;
                        warn!(
                            path = %log_path.display(),
                            line = lineno + 1,
                            error = %e,
                            "skipping corrupt processing record"
                        );
                    }
                }
            }
        }
        debug!(
            path = %log_path.display(),
            records = index.len(),
            skipped,
            "processing log loaded"
        );

        Ok(Self {
            log_path,
            lock_timeout,
            index: Mutex::new(index),
            skipped_lines: skipped,
        })
    }

    /// True when a `completed` record exists for `content_hash`.
    pub fn is_processed(&self, content_hash: &str) -> bool {
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(content_hash)
            .map(|r| r.status == ProcessingStatus::Completed)
            .unwrap_or(false)
    }

    /// Look up the full record for a hash.
    pub fn get(&self, content_hash: &str) -> Option<ProcessingRecord> {
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(content_hash)
            .cloned()
    }

    /// Append a record to the log and update the index.
    ///
    /// Durable on return: the line is flushed before the file lock is
    /// released.  Fails with [`TrackerError::Busy`] when another process
    /// holds the lock past the configured timeout.  The lock acquire and
    /// the append run on the blocking pool, so a contended log suspends
    /// the caller instead of stalling a runtime worker.
    pub async fn record(&self, record: ProcessingRecord) -> Result<(), TrackerError> {
        let path = self.log_path.clone();
        let timeout = self.lock_timeout;
        let to_append = record.clone();
        tokio::task::spawn_blocking(move || append_record(&path, timeout, &to_append))
            .await
            .map_err(|e| TrackerError::Io(std::io::Error::other(e)))??;

        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        insert_record(&mut index, record);
        Ok(())
    }

    /// Number of malformed lines skipped while rebuilding the index.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// A `completed` record is never downgraded by a later `failed` one for the
/// same hash; everything else is last-writer-wins.
fn insert_record(index: &mut HashMap<String, ProcessingRecord>, rec: ProcessingRecord) {
    match index.get(&rec.content_hash) {
        Some(existing)
            if existing.status == ProcessingStatus::Completed
                && rec.status == ProcessingStatus::Failed => {}
        _ => {
            index.insert(rec.content_hash.clone(), rec);
        }
    }
}

/// Blocking half of [`ProcessingTracker::record`]: open, lock, append,
/// flush, unlock.
fn append_record(
    path: &Path,
    timeout: Duration,
    record: &ProcessingRecord,
) -> Result<(), TrackerError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    lock_with_timeout(&file, timeout)?;
    let result = (|| -> Result<(), TrackerError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut f = &file;
        f.write_all(line.as_bytes())?;
        f.flush()?;
        Ok(())
    })();
    if let Err(e) = FileExt::unlock(&file) {
        warn!(error = %e, "failed to release processing log lock");
    }
    result
}

fn lock_with_timeout(file: &std::fs::File, timeout: Duration) -> Result<(), TrackerError> {
    let deadline = Instant::now() + timeout;
    loop {
        match file.try_lock_exclusive() {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => return Err(TrackerError::Io(e)),
        }
        if Instant::now() >= deadline {
            return Err(TrackerError::Busy);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(dir: &tempfile::TempDir) -> ProcessingTracker {
        ProcessingTracker::open(dir.path().join("processed.jsonl"), Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn fresh_log_reports_nothing_processed() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(&dir);
        assert!(!t.is_processed("abc"));
        assert_eq!(t.skipped_lines(), 0);
    }

    #[tokio::test]
    async fn record_then_query() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(&dir);
        t.record(ProcessingRecord::completed("h1", 42, Some("topics/ai/x.md".into())))
            .await
            .unwrap();
        assert!(t.is_processed("h1"));
        assert_eq!(t.get("h1").unwrap().kb_file.as_deref(), Some("topics/ai/x.md"));
    }

    #[tokio::test]
    async fn failed_records_do_not_count_as_processed() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(&dir);
        t.record(ProcessingRecord::failed("h2", 42)).await.unwrap();
        assert!(!t.is_processed("h2"));
        assert!(t.get("h2").is_some());
    }

    #[tokio::test]
    async fn completed_survives_later_failure_for_same_hash() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(&dir);
        t.record(ProcessingRecord::completed("h3", 1, None))
            .await
            .unwrap();
        t.record(ProcessingRecord::failed("h3", 1)).await.unwrap();
        assert!(t.is_processed("h3"));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.jsonl");
        {
            let t = ProcessingTracker::open(&path, Duration::from_secs(1)).unwrap();
            t.record(ProcessingRecord::completed("persist", 7, None))
                .await
                .unwrap();
        }
        let t2 = ProcessingTracker::open(&path, Duration::from_secs(1)).unwrap();
        assert!(t2.is_processed("persist"));
    }

    #[test]
    fn corrupt_lines_are_skipped_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.jsonl");
        let good = serde_json::to_string(&ProcessingRecord::completed("ok", 1, None)).unwrap();
        std::fs::write(&path, format!("{good}\nnot json at all\n{{\"half\":\n")).unwrap();
        let t = ProcessingTracker::open(&path, Duration::from_secs(1)).unwrap();
        assert!(t.is_processed("ok"));
        assert_eq!(t.skipped_lines(), 2);
    }

    #[tokio::test]
    async fn log_is_append_only_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(&dir);
        t.record(ProcessingRecord::completed("a", 1, None))
            .await
            .unwrap();
        t.record(ProcessingRecord::completed("b", 2, None))
            .await
            .unwrap();
        let text = std::fs::read_to_string(t.log_path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            serde_json::from_str::<ProcessingRecord>(line).unwrap();
        }
    }
}
