// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use skriv_events::{EventBus, Topic};

use crate::descriptor::KbRegistry;
use crate::lock::KbLockManager;

/// Rebuilds `index.md` for KBs whose working tree changed.
///
/// Subscribes to the file/folder change topics and coalesces bursts of
/// events (one agent task touching many files) into a single rebuild per
/// KB.  Runs as the `indexer` background task; the hosting task owns
/// cancellation, `run` simply loops until the event channel closes.
pub struct KbIndexer {
    registry: Arc<KbRegistry>,
    locks: Arc<KbLockManager>,
    rx: mpsc::UnboundedReceiver<(i64, String)>,
    debounce: Duration,
    _subs: Vec<skriv_events::Subscription>,
}

impl KbIndexer {
    pub fn new(bus: &EventBus, registry: Arc<KbRegistry>, locks: Arc<KbLockManager>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = Vec::new();
        for topic in [
            Topic::FileCreated,
            Topic::FileModified,
            Topic::FileDeleted,
            Topic::FolderCreated,
            Topic::FolderDeleted,
            Topic::FolderMoved,
        ] {
            let tx = tx.clone();
            subs.push(bus.subscribe(topic, move |ev| {
                if let skriv_events::Event::KbChanged { user_id, kb_id, .. } = ev {
                    let _ = tx.send((*user_id, kb_id.clone()));
                }
            }));
        }
        Self {
            registry,
            locks,
            rx,
            debounce: Duration::from_millis(500),
            _subs: subs,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Drain change signals and rebuild indexes until the channel closes.
    pub async fn run(mut self) {
        while let Some(first) = self.rx.recv().await {
            tokio::time::sleep(self.debounce).await;
            let mut dirty: HashSet<(i64, String)> = HashSet::new();
            dirty.insert(first);
            while let Ok(more) = self.rx.try_recv() {
                dirty.insert(more);
            }
            for (user_id, kb_id) in dirty {
                if let Err(e) = self.rebuild(user_id, &kb_id).await {
                    warn!(kb_id, error = %e, "index rebuild failed");
                }
            }
        }
    }

    async fn rebuild(&self, user_id: i64, kb_id: &str) -> anyhow::Result<()> {
        let Some(desc) = self.registry.get(user_id).filter(|d| d.kb_id == kb_id) else {
            debug!(kb_id, "KB no longer attached; skipping index rebuild");
            return Ok(());
        };
        let _guard = self
            .locks
            .lock(kb_id, &desc.root_path, "index rebuild")
            .await?;
        let index = render_index(&desc.topics_dir());
        tokio::fs::write(desc.root_path.join("index.md"), index).await?;
        debug!(kb_id, "index.md rebuilt");
        Ok(())
    }
}

/// Render the topic tree as markdown: one section per category, nested
/// bullet lists of notes with their first-heading titles.
pub fn render_index(topics_dir: &Path) -> String {
    let mut out = String::from("# Index\n");

    let mut notes: Vec<(String, String, String)> = Vec::new();
    for entry in WalkDir::new(topics_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file()
            || entry.path().extension().map(|e| e != "md").unwrap_or(true)
        {
            continue;
        }
        let rel = match entry.path().strip_prefix(topics_dir) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let category = rel
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_else(|| "misc".into());
        let title = note_title(entry.path()).unwrap_or_else(|| {
            entry
                .path()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        notes.push((category, title, format!("topics/{}", rel.display())));
    }

    let mut current_category = String::new();
    for (category, title, path) in notes {
        if category != current_category {
            out.push_str(&format!("\n## {category}\n\n"));
            current_category = category;
        }
        out.push_str(&format!("- [{title}]({path})\n"));
    }
    out
}

fn note_title(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    text.lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use skriv_events::{Event, KbChange, KbChangeKind};

    use super::*;

    #[test]
    fn render_groups_by_category() {
        let dir = tempfile::tempdir().unwrap();
        let topics = dir.path().join("topics");
        std::fs::create_dir_all(topics.join("ai/nlp")).unwrap();
        std::fs::create_dir_all(topics.join("rust")).unwrap();
        std::fs::write(
            topics.join("ai/nlp/2026-01-01-attn.md"),
            "# Attention\n\nbody",
        )
        .unwrap();
        std::fs::write(topics.join("rust/2026-01-02-borrow.md"), "# Borrowing\n").unwrap();

        let index = render_index(&topics);
        assert!(index.contains("## ai"));
        assert!(index.contains("## rust"));
        assert!(index.contains("[Attention](topics/ai/nlp/2026-01-01-attn.md)"));
        assert!(index.contains("[Borrowing](topics/rust/2026-01-02-borrow.md)"));
    }

    #[test]
    fn render_untitled_note_uses_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let topics = dir.path().join("topics");
        std::fs::create_dir_all(topics.join("misc")).unwrap();
        std::fs::write(topics.join("misc/2026-01-01-raw.md"), "no heading here").unwrap();
        let index = render_index(&topics);
        assert!(index.contains("[2026-01-01-raw]"));
    }

    #[tokio::test]
    async fn events_trigger_index_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(KbRegistry::new(dir.path(), false));
        let desc = registry.get_or_create(1).unwrap();
        std::fs::write(desc.topics_dir().join("note.md"), "# First Note\n").unwrap();

        let locks = Arc::new(KbLockManager::new(Duration::from_secs(1)));
        let indexer = KbIndexer::new(&bus, Arc::clone(&registry), locks)
            .with_debounce(Duration::from_millis(10));
        let handle = tokio::spawn(indexer.run());

        bus.publish(&Event::KbChanged {
            user_id: 1,
            kb_id: desc.kb_id.clone(),
            change: KbChange::new(KbChangeKind::FileCreated, "topics/note.md"),
            source: "test".into(),
        });

        let index_path = desc.root_path.join("index.md");
        let mut waited = Duration::ZERO;
        while !index_path.exists() && waited < Duration::from_secs(2) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += Duration::from_millis(20);
        }
        handle.abort();
        let index = std::fs::read_to_string(&index_path).unwrap();
        assert!(index.contains("First Note"));
    }
}
