// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use chrono::NaiveDate;

/// Structured placement hints for a note.
///
/// Either extracted from a fenced ```metadata block inside the note body or
/// supplied by the agent's structured result; the fenced block wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteMetadata {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub tags: Vec<String>,
}

impl NoteMetadata {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.subcategory.is_none() && self.tags.is_empty()
    }
}

/// Parse the first fenced block tagged `metadata` from a markdown body.
///
/// ```metadata
/// category: ai
/// subcategory: machine-learning
/// tags: gpt, transformer
/// ```
///
/// Unknown keys are ignored; a missing block yields `None`.
pub fn parse_metadata_block(markdown: &str) -> Option<NoteMetadata> {
    let mut lines = markdown.lines();
    loop {
        let line = lines.next()?;
        if line.trim() == "```metadata" {
            break;
        }
    }

    let mut meta = NoteMetadata::default();
    for line in lines.by_ref() {
        let line = line.trim();
        if line == "```" {
            return Some(meta);
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "category" => meta.category = Some(value.to_string()),
            "subcategory" => meta.subcategory = Some(value.to_string()),
            "tags" => {
                meta.tags = value
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            }
            _ => {}
        }
    }
    // Unterminated fence: treat what was gathered as valid.
    Some(meta)
}

/// Reduce a title to a filesystem-safe slug: lowercase ASCII alphanumerics
/// joined by single dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("note");
    }
    slug
}

/// Build the KB-relative path for a new note:
/// `topics/<category>/<subcategory>/YYYY-MM-DD-<slug>.md`.
///
/// Missing placement hints fall back to `misc`; the subcategory level is
/// omitted entirely when absent.
pub fn note_relative_path(meta: &NoteMetadata, title: &str, date: NaiveDate) -> PathBuf {
    let mut path = PathBuf::from("topics");
    path.push(slugify(meta.category.as_deref().unwrap_or("misc")));
    if let Some(sub) = &meta.subcategory {
        path.push(slugify(sub));
    }
    path.push(format!("{}-{}.md", date.format("%Y-%m-%d"), slugify(title)));
    path
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
