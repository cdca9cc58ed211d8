// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use skriv_events::KbChange;

/// Collects the KB mutations performed through the registry during one
/// agent task, so the router can report a structured summary even when the
/// model did not produce one.
///
/// Tools record only successful mutations; a failed operation leaves the
/// tracker untouched.
#[derive(Debug, Default)]
pub struct KbChangesTracker {
    changes: Mutex<Vec<KbChange>>,
}

impl KbChangesTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, change: KbChange) {
        self.changes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(change);
    }

    pub fn snapshot(&self) -> Vec<KbChange> {
        self.changes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.changes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Human-readable change list for the end-of-task summary message.
    pub fn summary(&self) -> String {
        let changes = self.changes.lock().unwrap_or_else(|e| e.into_inner());
        if changes.is_empty() {
            return "No KB changes.".to_string();
        }
        let mut out = String::new();
        for c in changes.iter() {
            use skriv_events::KbChangeKind::*;
            let verb = match c.kind {
                FileCreated => "created",
                FileModified => "modified",
                FileDeleted => "deleted",
                FolderCreated => "created folder",
                FolderDeleted => "deleted folder",
                FolderMoved => "moved folder",
            };
            match &c.moved_to {
                Some(to) => {
                    out.push_str(&format!("- {verb} {} → {}\n", c.path.display(), to.display()))
                }
                None => out.push_str(&format!("- {verb} {}\n", c.path.display())),
            }
        }
        out
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use skriv_events::KbChangeKind;

    use super::*;

    #[test]
    fn empty_tracker_reports_no_changes() {
        let t = KbChangesTracker::new();
        assert!(t.is_empty());
        assert_eq!(t.summary(), "No KB changes.");
    }

    #[test]
    fn records_keep_insertion_order() {
        let t = KbChangesTracker::new();
        t.record(KbChange::new(KbChangeKind::FileCreated, "topics/a.md"));
        t.record(KbChange::new(KbChangeKind::FileDeleted, "topics/b.md"));
        let snap = t.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].kind, KbChangeKind::FileCreated);
        assert_eq!(snap[1].kind, KbChangeKind::FileDeleted);
    }

    #[test]
    fn summary_mentions_moves_with_destination() {
        let t = KbChangesTracker::new();
        t.record(KbChange::moved(
            KbChangeKind::FolderMoved,
            "topics/old",
            "topics/new",
        ));
        let s = t.summary();
        assert!(s.contains("moved folder topics/old → topics/new"));
    }
}
