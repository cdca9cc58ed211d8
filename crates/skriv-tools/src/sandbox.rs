// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("path '{0}' escapes the knowledge base root")]
    Escape(String),
    #[error("path '{0}' escapes through a symlink")]
    SymlinkEscape(String),
    #[error("path '{0}' is outside the writable topics area")]
    OutsideTopics(String),
    #[error("empty path")]
    Empty,
}

/// Resolve a tool path argument against the KB root and enforce the
/// sandbox.
///
/// Rules:
/// - relative paths are joined onto `kb_root`; absolute paths are accepted
///   only when they already lie under it;
/// - `..` components are resolved lexically and must never climb above the
///   root;
/// - the deepest existing ancestor is canonicalized so a symlink inside the
///   KB cannot point the operation outside it;
/// - with `topics_only`, the result must additionally lie under
///   `<kb_root>/topics`.
///
/// Canonicalization of the root itself can fail with `NotFound` when the
/// process cwd has been deleted; resolution then falls back to the lexical
/// absolute form — the containment checks still apply to that form.
pub fn resolve_sandboxed(
    kb_root: &Path,
    topics_only: bool,
    raw: &str,
) -> Result<PathBuf, SandboxError> {
    if raw.trim().is_empty() {
        return Err(SandboxError::Empty);
    }

    let raw_path = Path::new(raw);
    let candidate = if raw_path.is_absolute() {
        raw_path.to_path_buf()
    } else {
        kb_root.join(raw_path)
    };

    // Lexical normalization: resolve `.` and `..` without touching the
    // filesystem, rejecting any traversal that pops past the start.
    let normalized = normalize_lexically(&candidate).ok_or_else(|| SandboxError::Escape(raw.into()))?;

    // The root may itself contain symlinks (or be unresolvable when the cwd
    // vanished); normalize it the same way the candidate was normalized so
    // the prefix comparison is apples-to-apples.
    let root = canonical_or_lexical(kb_root);
    let normalized = match canonical_prefix(&normalized) {
        Some(resolved) => resolved,
        None => normalized,
    };

    if !normalized.starts_with(&root) {
        // Distinguish the symlink case for better diagnostics: the lexical
        // form was inside the root, but resolution moved it out.
        let lexical = normalize_lexically(&candidate).unwrap_or_else(|| candidate.clone());
        if lexical.starts_with(&root) {
            return Err(SandboxError::SymlinkEscape(raw.into()));
        }
        return Err(SandboxError::Escape(raw.into()));
    }

    if topics_only {
        let topics = root.join("topics");
        if !normalized.starts_with(&topics) {
            return Err(SandboxError::OutsideTopics(raw.into()));
        }
    }

    Ok(normalized)
}

/// Resolve `.` and `..` components lexically.  Returns `None` when a `..`
/// would climb above the path's root.
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for comp in path.components() {
        match comp {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(c) => {
                out.push(c);
                depth += 1;
            }
        }
    }
    Some(out)
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// not-yet-existing tail.  `None` when nothing on the path exists yet (the
/// lexical form is then used as-is).
fn canonical_prefix(path: &Path) -> Option<PathBuf> {
    let mut existing = path;
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(canon) => {
                let mut out = canon;
                for part in tail.iter().rev() {
                    out.push(part);
                }
                return Some(out);
            }
            Err(_) => {
                tail.push(existing.file_name()?);
                existing = existing.parent()?;
            }
        }
    }
}

/// `canonicalize` with a lexical fallback for a missing-cwd `NotFound`.
fn canonical_or_lexical(path: &Path) -> PathBuf {
    path.canonicalize()
        .ok()
        .or_else(|| normalize_lexically(path))
        .unwrap_or_else(|| path.to_path_buf())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
