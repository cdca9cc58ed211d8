// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Identity and storage settings of one knowledge base.
///
/// Created when a user attaches a KB; mutated only through the registry's
/// explicit switch/create operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbDescriptor {
    pub kb_id: String,
    pub root_path: PathBuf,
    pub git_remote: Option<String>,
    pub git_branch: Option<String>,
    pub git_enabled: bool,
}

impl KbDescriptor {
    pub fn topics_dir(&self) -> PathBuf {
        self.root_path.join("topics")
    }
}

/// In-memory map of user → active KB.
///
/// Persistent user-settings storage is an external concern; the registry
/// only guarantees that the on-disk skeleton (`topics/`) exists for every
/// descriptor it hands out.
pub struct KbRegistry {
    base_dir: PathBuf,
    inner: RwLock<HashMap<i64, KbDescriptor>>,
    git_enabled_default: bool,
}

impl KbRegistry {
    pub fn new(base_dir: impl Into<PathBuf>, git_enabled_default: bool) -> Self {
        Self {
            base_dir: base_dir.into(),
            inner: RwLock::new(HashMap::new()),
            git_enabled_default,
        }
    }

    /// The active KB for `user_id`, creating a default one on first use.
    pub fn get_or_create(&self, user_id: i64) -> anyhow::Result<KbDescriptor> {
        if let Some(desc) = self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
        {
            return Ok(desc.clone());
        }
        self.create(user_id, &format!("kb_user_{user_id}"))
    }

    /// The active KB for `user_id`, if one is attached.
    pub fn get(&self, user_id: i64) -> Option<KbDescriptor> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .cloned()
    }

    /// Resolve a descriptor by its `kb_id` (used by event subscribers that
    /// only see ids).
    pub fn find(&self, kb_id: &str) -> Option<KbDescriptor> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|d| d.kb_id == kb_id)
            .cloned()
    }

    /// Create a KB named `name` under the base directory and make it the
    /// user's active KB.
    pub fn create(&self, user_id: i64, name: &str) -> anyhow::Result<KbDescriptor> {
        let root = self.base_dir.join(name);
        ensure_skeleton(&root)?;
        let desc = KbDescriptor {
            kb_id: name.to_string(),
            root_path: root,
            git_remote: None,
            git_branch: None,
            git_enabled: self.git_enabled_default,
        };
        info!(user_id, kb_id = %desc.kb_id, "KB attached");
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id, desc.clone());
        Ok(desc)
    }

    /// Switch the user's active KB to an existing directory.
    pub fn switch(&self, user_id: i64, desc: KbDescriptor) -> anyhow::Result<()> {
        ensure_skeleton(&desc.root_path)?;
        info!(user_id, kb_id = %desc.kb_id, "KB switched");
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id, desc);
        Ok(())
    }
}

fn ensure_skeleton(root: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(root.join("topics"))?;
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_builds_skeleton() {
        let dir = tempfile::tempdir().unwrap();
        let reg = KbRegistry::new(dir.path(), true);
        let desc = reg.get_or_create(42).unwrap();
        assert_eq!(desc.kb_id, "kb_user_42");
        assert!(desc.topics_dir().is_dir());
    }

    #[test]
    fn second_call_returns_same_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let reg = KbRegistry::new(dir.path(), true);
        let a = reg.get_or_create(1).unwrap();
        let b = reg.get_or_create(1).unwrap();
        assert_eq!(a.kb_id, b.kb_id);
        assert_eq!(a.root_path, b.root_path);
    }

    #[test]
    fn find_by_kb_id() {
        let dir = tempfile::tempdir().unwrap();
        let reg = KbRegistry::new(dir.path(), false);
        reg.get_or_create(7).unwrap();
        let found = reg.find("kb_user_7").unwrap();
        assert!(!found.git_enabled);
        assert!(reg.find("kb_user_8").is_none());
    }

    #[test]
    fn switch_replaces_active_kb() {
        let dir = tempfile::tempdir().unwrap();
        let reg = KbRegistry::new(dir.path(), true);
        reg.get_or_create(1).unwrap();
        let other = KbDescriptor {
            kb_id: "work".into(),
            root_path: dir.path().join("work"),
            git_remote: None,
            git_branch: Some("notes".into()),
            git_enabled: false,
        };
        reg.switch(1, other).unwrap();
        assert_eq!(reg.get(1).unwrap().kb_id, "work");
        assert!(dir.path().join("work/topics").is_dir());
    }
}
